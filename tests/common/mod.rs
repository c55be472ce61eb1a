// Shared helpers for integration tests.
//
// `FakeHost` is an in-memory remote machine that understands the handful of
// shell commands the template sync engine and task runner issue.
#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::rc::Rc;

use rigger::models::{ExecOptions, ExecOutput};
use rigger::system::executor::{ExecResult, RemoteExecutor};
use rigger::system::prompt::{ConflictAnswer, ConflictPrompt, PromptResult};
use walkdir::WalkDir;

/// A command as the fake host received it.
#[derive(Debug, Clone)]
pub struct Received {
    pub host: Option<String>,
    pub command: String,
    pub options: ExecOptions,
}

#[derive(Debug, Default)]
struct HostState {
    files: BTreeMap<String, Vec<u8>>,
    received: Vec<Received>,
    /// Paths written outside temp dirs (rsync targets and checksum ledgers).
    writes: Vec<String>,
    next_tmp: usize,
}

/// In-memory remote filesystem; clones share state.
#[derive(Debug, Clone, Default)]
pub struct FakeHost {
    state: Rc<RefCell<HostState>>,
}

fn ok(stdout: impl Into<String>) -> ExecOutput {
    ExecOutput {
        exit_code: 0,
        stdout: stdout.into(),
        stderr: String::new(),
    }
}

fn fail(stderr: &str) -> ExecOutput {
    ExecOutput {
        exit_code: 1,
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

pub fn checksum(bytes: &[u8]) -> String {
    hex::encode(blake3::hash(bytes).as_bytes())
}

fn basename(path: &str) -> &str {
    path.trim_end_matches('/').rsplit('/').next().unwrap_or(path)
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&self, path: &str, contents: &str) {
        self.state
            .borrow_mut()
            .files
            .insert(path.to_string(), contents.as_bytes().to_vec());
    }

    pub fn read(&self, path: &str) -> Option<String> {
        self.state
            .borrow()
            .files
            .get(path)
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }

    pub fn exists(&self, path: &str) -> bool {
        self.state.borrow().files.contains_key(path)
    }

    pub fn paths(&self) -> Vec<String> {
        self.state.borrow().files.keys().cloned().collect()
    }

    pub fn received(&self) -> Vec<Received> {
        self.state.borrow().received.clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.received().into_iter().map(|r| r.command).collect()
    }

    pub fn writes(&self) -> Vec<String> {
        self.state.borrow().writes.clone()
    }

    /// Forgets received commands and recorded writes, keeping the files.
    pub fn reset_log(&self) {
        let mut state = self.state.borrow_mut();
        state.received.clear();
        state.writes.clear();
    }

    /// A valid checksum ledger for the current content of `path`.
    pub fn ledger_matches(&self, path: &str) -> bool {
        let state = self.state.borrow();
        match (state.files.get(path), state.files.get(&format!("{}.md5", path))) {
            (Some(content), Some(ledger)) => {
                String::from_utf8_lossy(ledger).split_whitespace().next() == Some(checksum(content).as_str())
            }
            _ => false,
        }
    }

    fn interpret(&self, command: &str) -> ExecOutput {
        let mut state = self.state.borrow_mut();

        if command.starts_with("chown") || command.starts_with("chmod") {
            return ok("");
        }
        if command == "mktemp -d" {
            state.next_tmp += 1;
            return ok(format!("/tmp/fake.{}\n", state.next_tmp));
        }
        if let Some((check, _)) = command.split_once(" || ")
            && check.starts_with("md5sum -c")
        {
            let args = shlex::split(check).unwrap_or_default();
            let ledger_path = args.last().cloned().unwrap_or_default();
            let Some(ledger) = state.files.get(&ledger_path) else {
                return ok("");
            };
            let target = ledger_path.trim_end_matches(".md5");
            let expected = String::from_utf8_lossy(ledger)
                .split_whitespace()
                .next()
                .unwrap_or_default()
                .to_string();
            return match state.files.get(target) {
                Some(content) if checksum(content) == expected => ok(""),
                _ => fail("checksum mismatch"),
            };
        }
        if let Some((sum, ledger)) = command.split_once(" > ")
            && sum.starts_with("md5sum ")
        {
            let target = shlex::split(sum).unwrap_or_default().pop().unwrap_or_default();
            let ledger = shlex::split(ledger).unwrap_or_default().pop().unwrap_or_default();
            let Some(content) = state.files.get(&target) else {
                return fail("no such file");
            };
            let line = format!("{}  {}\n", checksum(content), target);
            state.files.insert(ledger.clone(), line.into_bytes());
            state.writes.push(ledger);
            return ok("");
        }

        let args = shlex::split(command).unwrap_or_default();
        match args.first().map(String::as_str) {
            Some("cat") => {
                let path = args.get(1).cloned().unwrap_or_default();
                match state.files.get(&path) {
                    Some(content) => ok(String::from_utf8_lossy(content).into_owned()),
                    None => fail("no such file"),
                }
            }
            Some("test") if args.get(1).map(String::as_str) == Some("-d") => {
                let dir = args.get(2).map(|d| d.trim_end_matches('/')).unwrap_or_default();
                let prefix = format!("{}/", dir);
                if state.files.keys().any(|path| path.starts_with(&prefix)) {
                    ok("")
                } else {
                    fail("not a directory")
                }
            }
            Some("rm") => {
                let dir = args.last().cloned().unwrap_or_default();
                let prefix = format!("{}/", dir.trim_end_matches('/'));
                state.files.retain(|path, _| !path.starts_with(&prefix) && *path != dir);
                ok("")
            }
            Some("rsync") => {
                let (Some(destination), Some(source)) = (args.iter().nth_back(0), args.iter().nth_back(1)) else {
                    return fail("usage");
                };
                let (source, destination) = (source.clone(), destination.clone());
                let mut copies = Vec::new();
                if source.ends_with('/') {
                    let root = destination.trim_end_matches('/');
                    for (path, content) in state.files.iter() {
                        if let Some(relative) = path.strip_prefix(&source) {
                            copies.push((relative.to_string(), format!("{}/{}", root, relative), content.clone()));
                        }
                    }
                } else if let Some(content) = state.files.get(&source) {
                    let target = if destination.ends_with('/') {
                        format!("{}{}", destination, basename(&source))
                    } else {
                        destination.clone()
                    };
                    copies.push((basename(&source).to_string(), target, content.clone()));
                }

                let mut printed = String::new();
                for (name, target, content) in copies {
                    if state.files.get(&target) == Some(&content) {
                        continue;
                    }
                    state.files.insert(target.clone(), content);
                    state.writes.push(target);
                    printed.push_str(&name);
                    printed.push('\n');
                }
                ok(printed)
            }
            _ => ok(""),
        }
    }
}

impl RemoteExecutor for FakeHost {
    fn execute(&self, host: Option<&str>, command: &str, options: &ExecOptions) -> ExecResult<ExecOutput> {
        self.state.borrow_mut().received.push(Received {
            host: host.map(str::to_string),
            command: command.to_string(),
            options: options.clone(),
        });
        Ok(self.interpret(command))
    }

    fn put_dir(&self, _host: Option<&str>, local_dir: &Path, remote_dir: &str, _use_sudo: bool) -> ExecResult<()> {
        let mut state = self.state.borrow_mut();
        for entry in WalkDir::new(local_dir).into_iter().filter_map(Result::ok) {
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(local_dir) else { continue };
            let relative = relative.to_string_lossy().replace('\\', "/");
            let content = std::fs::read(entry.path()).unwrap_or_default();
            state
                .files
                .insert(format!("{}/{}", remote_dir.trim_end_matches('/'), relative), content);
        }
        Ok(())
    }
}

/// Answers conflict prompts from a queue and records what was asked.
#[derive(Debug, Default)]
pub struct ScriptedPrompt {
    answers: RefCell<VecDeque<ConflictAnswer>>,
    asked: RefCell<Vec<String>>,
}

impl ScriptedPrompt {
    pub fn new(answers: &[ConflictAnswer]) -> Self {
        Self {
            answers: RefCell::new(answers.iter().copied().collect()),
            asked: RefCell::new(Vec::new()),
        }
    }

    pub fn asked(&self) -> Vec<String> {
        self.asked.borrow().clone()
    }
}

impl ConflictPrompt for ScriptedPrompt {
    fn ask(&self, template: &str) -> PromptResult<ConflictAnswer> {
        self.asked.borrow_mut().push(template.to_string());
        Ok(self.answers.borrow_mut().pop_front().unwrap_or(ConflictAnswer::Skip))
    }
}

/// Writes `files` (relative path, contents) under `root`.
pub fn write_tree(root: &Path, files: &[(&str, &str)]) {
    for (relative, contents) in files {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create template dir");
        }
        std::fs::write(&path, contents).expect("write template");
    }
}
