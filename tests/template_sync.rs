mod common;

use std::path::Path;

use common::{FakeHost, ScriptedPrompt, write_tree};
use rigger::core::operations::Operations;
use rigger::core::template_sync::TemplateSync;
use rigger::models::{ExecOptions, ExecOutput};
use rigger::system::executor::{ExecResult, RemoteExecutor};
use rigger::system::prompt::ConflictAnswer;
use rigger::system::renderer::TeraRenderer;
use tempfile::TempDir;
use toml::{Table, Value};

const CONFIG: &str = r#"
user = "deploy"
sudo_user = "root"
"#;

struct Fixture {
    templates: TempDir,
    renderer: TeraRenderer,
    host: FakeHost,
    tree: Table,
}

fn fixture() -> Fixture {
    let templates = tempfile::tempdir().unwrap();
    write_tree(
        templates.path(),
        &[
            ("app/app.conf", "workers = {{ workers }}"),
            ("app/motd.txt", "Welcome to {{ n }}"),
            ("app/.DS_Store", "junk"),
            ("bin/run.sh.__raw__", "#!/bin/sh\necho {{ not_rendered }}\n"),
        ],
    );
    Fixture {
        renderer: TeraRenderer::new(vec![templates.path().to_path_buf()]),
        templates,
        host: FakeHost::new(),
        tree: toml::from_str(CONFIG).unwrap(),
    }
}

fn context(workers: i64) -> Table {
    let mut context = Table::new();
    context.insert("workers".to_string(), Value::Integer(workers));
    context
}

fn sync(fx: &Fixture, prompt: &ScriptedPrompt, source: &str, destination: &str, workers: i64) -> Vec<String> {
    let ops = Operations::new(&fx.host, &fx.tree, Some("web1")).unwrap();
    TemplateSync::new(&ops, &fx.renderer, prompt)
        .sync(source, destination, &context(workers), None, None)
        .unwrap()
}

#[test]
fn test_first_sync_uploads_everything_and_writes_ledgers() {
    // --- Setup ---
    let fx = fixture();
    let prompt = ScriptedPrompt::default();

    // --- Execute ---
    let updated = sync(&fx, &prompt, "app/", "/etc/app/", 4);

    // --- Assert ---
    assert_eq!(updated, vec!["app.conf", "motd.txt"]);
    assert_eq!(fx.host.read("/etc/app/app.conf").as_deref(), Some("workers = 4\n"));
    assert_eq!(fx.host.read("/etc/app/motd.txt").as_deref(), Some("Welcome to motd\n"));
    assert!(fx.host.ledger_matches("/etc/app/app.conf"));
    assert!(fx.host.ledger_matches("/etc/app/motd.txt"));
    assert!(!fx.host.exists("/etc/app/.DS_Store"));
    assert!(prompt.asked().is_empty());
}

#[test]
fn test_unchanged_source_writes_nothing() {
    // --- Setup ---
    let fx = fixture();
    let prompt = ScriptedPrompt::default();
    sync(&fx, &prompt, "app/", "/etc/app/", 4);
    fx.host.reset_log();

    // --- Execute ---
    let updated = sync(&fx, &prompt, "app/", "/etc/app/", 4);

    // --- Assert ---
    assert!(updated.is_empty());
    assert!(fx.host.writes().is_empty());
    assert!(prompt.asked().is_empty());
}

#[test]
fn test_changed_source_updates_only_that_file() {
    // --- Setup ---
    let fx = fixture();
    let prompt = ScriptedPrompt::default();
    sync(&fx, &prompt, "app/", "/etc/app/", 4);
    fx.host.reset_log();

    // --- Execute ---
    let updated = sync(&fx, &prompt, "app/", "/etc/app/", 8);

    // --- Assert ---
    assert_eq!(updated, vec!["app.conf"]);
    assert_eq!(fx.host.read("/etc/app/app.conf").as_deref(), Some("workers = 8\n"));
    assert!(fx.host.ledger_matches("/etc/app/app.conf"));
    assert_eq!(fx.host.writes(), vec!["/etc/app/app.conf", "/etc/app/app.conf.md5"]);
}

#[test]
fn test_remote_edit_skipped_by_default() {
    // --- Setup ---
    let fx = fixture();
    sync(&fx, &ScriptedPrompt::default(), "app/", "/etc/app/", 4);
    fx.host.write("/etc/app/app.conf", "edited by hand\n");
    let prompt = ScriptedPrompt::new(&[ConflictAnswer::Skip]);

    // --- Execute ---
    let updated = sync(&fx, &prompt, "app/", "/etc/app/", 8);

    // --- Assert ---
    assert!(updated.is_empty());
    assert_eq!(prompt.asked(), vec!["app/app.conf"]);
    assert_eq!(fx.host.read("/etc/app/app.conf").as_deref(), Some("edited by hand\n"));
}

#[test]
fn test_remote_edit_overwritten_on_request() {
    // --- Setup ---
    let fx = fixture();
    sync(&fx, &ScriptedPrompt::default(), "app/", "/etc/app/", 4);
    fx.host.write("/etc/app/app.conf", "edited by hand\n");
    let prompt = ScriptedPrompt::new(&[ConflictAnswer::Overwrite]);

    // --- Execute ---
    let updated = sync(&fx, &prompt, "app/", "/etc/app/", 4);

    // --- Assert ---
    assert_eq!(updated, vec!["app.conf"]);
    assert_eq!(fx.host.read("/etc/app/app.conf").as_deref(), Some("workers = 4\n"));
    assert!(fx.host.ledger_matches("/etc/app/app.conf"));
}

#[test]
fn test_diff_reads_remote_copy_and_asks_again() {
    // --- Setup ---
    let fx = fixture();
    sync(&fx, &ScriptedPrompt::default(), "app/", "/etc/app/", 4);
    fx.host.write("/etc/app/app.conf", "edited by hand\n");
    fx.host.reset_log();
    let prompt = ScriptedPrompt::new(&[ConflictAnswer::Diff, ConflictAnswer::Skip]);

    // --- Execute ---
    let updated = sync(&fx, &prompt, "app/", "/etc/app/", 4);

    // --- Assert ---
    assert!(updated.is_empty());
    assert_eq!(prompt.asked(), vec!["app/app.conf", "app/app.conf"]);
    assert!(fx.host.commands().iter().any(|c| c == "cat /etc/app/app.conf"));
}

#[test]
fn test_single_template_renamed_on_deploy() {
    // --- Setup ---
    let fx = fixture();
    let prompt = ScriptedPrompt::default();

    // --- Execute ---
    let updated = sync(&fx, &prompt, "./app/app.conf", "/etc/app/custom.conf", 2);

    // --- Assert ---
    assert_eq!(updated, vec!["custom.conf"]);
    assert_eq!(fx.host.read("/etc/app/custom.conf").as_deref(), Some("workers = 2\n"));
    assert!(fx.host.ledger_matches("/etc/app/custom.conf"));
    assert!(!fx.host.exists("/etc/app/app.conf"));
}

#[test]
fn test_raw_template_copied_verbatim() {
    let fx = fixture();
    let prompt = ScriptedPrompt::default();

    let updated = sync(&fx, &prompt, "bin/", "/usr/local/bin/", 1);

    assert_eq!(updated, vec!["run.sh"]);
    assert_eq!(
        fx.host.read("/usr/local/bin/run.sh").as_deref(),
        Some("#!/bin/sh\necho {{ not_rendered }}\n")
    );
}

#[test]
fn test_no_matching_templates_touches_nothing() {
    let fx = fixture();
    let prompt = ScriptedPrompt::default();

    let updated = sync(&fx, &prompt, "nginx/", "/etc/nginx/", 1);

    assert!(updated.is_empty());
    assert!(fx.host.commands().is_empty());
}

#[test]
fn test_remote_temp_dir_removed() {
    let fx = fixture();
    let prompt = ScriptedPrompt::default();

    sync(&fx, &prompt, "app/", "/etc/app/", 4);

    assert!(fx.host.paths().iter().all(|p| !p.starts_with("/tmp/")));
    assert!(fx.host.commands().iter().any(|c| c == "rm -rf /tmp/fake.1"));
}

#[test]
fn test_commands_run_as_root_through_sudo() {
    let fx = fixture();
    let prompt = ScriptedPrompt::default();

    sync(&fx, &prompt, "app/", "/etc/app/", 4);

    let received = fx.host.received();
    let rsync = received.iter().find(|r| r.command.starts_with("rsync")).unwrap();
    assert!(rsync.options.sudo);
    assert_eq!(rsync.options.user.as_deref(), Some("root"));
    assert_eq!(rsync.host.as_deref(), Some("web1"));
}

#[test]
fn test_broken_template_outside_source_is_ignored() {
    // --- Setup ---
    let fx = fixture();
    write_tree(fx.templates.path(), &[("other/broken.conf", "{% if %}")]);
    let prompt = ScriptedPrompt::default();

    // --- Execute ---
    let updated = sync(&fx, &prompt, "app/", "/etc/app/", 4);

    // --- Assert ---
    assert_eq!(updated, vec!["app.conf", "motd.txt"]);
    assert_eq!(fx.host.read("/etc/app/app.conf").as_deref(), Some("workers = 4\n"));
}

#[test]
fn test_undecodable_template_left_out_of_batch() {
    // --- Setup ---
    let fx = fixture();
    std::fs::write(fx.templates.path().join("app/blob.bin"), [0xff, 0xfe, 0x00]).unwrap();
    let prompt = ScriptedPrompt::default();

    // --- Execute ---
    let updated = sync(&fx, &prompt, "app/", "/etc/app/", 4);

    // --- Assert ---
    assert_eq!(updated, vec!["app.conf", "motd.txt"]);
    assert!(!fx.host.exists("/etc/app/blob.bin"));
    assert!(fx.host.ledger_matches("/etc/app/app.conf"));
}

#[test]
fn test_diff_of_undecodable_template_asks_again() {
    // --- Setup ---
    let fx = fixture();
    std::fs::write(fx.templates.path().join("app/blob.bin"), [0xff, 0xfe, 0x00]).unwrap();
    fx.host.write("/etc/app/blob.bin", "remote copy\n");
    fx.host.write("/etc/app/blob.bin.md5", "0000  /etc/app/blob.bin\n");
    let prompt = ScriptedPrompt::new(&[ConflictAnswer::Diff, ConflictAnswer::Skip]);

    // --- Execute ---
    let updated = sync(&fx, &prompt, "app/", "/etc/app/", 4);

    // --- Assert ---
    assert_eq!(updated, vec!["app.conf", "motd.txt"]);
    assert_eq!(prompt.asked(), vec!["app/blob.bin", "app/blob.bin"]);
    assert!(!fx.host.commands().iter().any(|c| c == "cat /etc/app/blob.bin"));
    assert_eq!(fx.host.read("/etc/app/blob.bin").as_deref(), Some("remote copy\n"));
}

#[test]
fn test_single_template_into_existing_directory() {
    // --- Setup ---
    let fx = fixture();
    fx.host.write("/etc/app/other.conf", "unrelated\n");
    let prompt = ScriptedPrompt::default();

    // --- Execute ---
    let updated = sync(&fx, &prompt, "./app/app.conf", "/etc/app", 3);

    // --- Assert ---
    assert_eq!(updated, vec!["app.conf"]);
    assert_eq!(fx.host.read("/etc/app/app.conf").as_deref(), Some("workers = 3\n"));
    assert!(fx.host.ledger_matches("/etc/app/app.conf"));
    assert!(!fx.host.exists("/etc/app.md5"));
}

/// Delegates to a `FakeHost` but reports every rsync as failed.
struct FailingRsync(FakeHost);

impl RemoteExecutor for FailingRsync {
    fn execute(&self, host: Option<&str>, command: &str, options: &ExecOptions) -> ExecResult<ExecOutput> {
        let output = self.0.execute(host, command, options)?;
        if command.starts_with("rsync") {
            return Ok(ExecOutput {
                exit_code: 23,
                stdout: String::new(),
                stderr: "rsync: partial transfer".to_string(),
            });
        }
        Ok(output)
    }

    fn put_dir(&self, host: Option<&str>, local_dir: &Path, remote_dir: &str, use_sudo: bool) -> ExecResult<()> {
        self.0.put_dir(host, local_dir, remote_dir, use_sudo)
    }
}

#[test]
fn test_remote_temp_dir_removed_when_rsync_fails() {
    // --- Setup ---
    let fx = fixture();
    let executor = FailingRsync(fx.host.clone());
    let ops = Operations::new(&executor, &fx.tree, Some("web1")).unwrap();
    let prompt = ScriptedPrompt::default();

    // --- Execute ---
    let result = TemplateSync::new(&ops, &fx.renderer, &prompt).sync("app/", "/etc/app/", &context(4), None, None);

    // --- Assert ---
    assert!(result.is_err());
    assert!(fx.host.commands().iter().any(|c| c == "rm -rf /tmp/fake.1"));
    assert!(fx.host.paths().iter().all(|p| !p.starts_with("/tmp/")));
    assert!(!fx.host.exists("/etc/app/app.conf.md5"));
}
