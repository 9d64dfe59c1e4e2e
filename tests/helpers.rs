//! Shared test utilities for usbfreedom tests.
//!
//! Nothing here touches real block devices. External tools are answered by
//! a [`ScriptedRunner`]; mounts land on real temporary directories so the
//! persistence layout is written and read back for real.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;
use tempfile::TempDir;
use walkdir::WalkDir;

use usbfreedom::error::Result;
use usbfreedom::flash::{FlashOptions, Platform};
use usbfreedom::partition::MIB;
use usbfreedom::process::{Cmd, CommandResult, CommandRunner};

pub const GIB: u64 = 1024 * MIB;

/// Size reported for the scripted stick.
pub const STICK_BYTES: u64 = 8 * GIB;

type Handler = Box<dyn Fn(&Cmd) -> CommandResult>;

struct Rule {
    program: String,
    prefix: Vec<String>,
    handler: Handler,
}

impl Rule {
    fn matches(&self, cmd: &Cmd) -> bool {
        cmd.program() == self.program
            && cmd.get_args().len() >= self.prefix.len()
            && cmd.get_args().iter().zip(&self.prefix).all(|(a, p)| a == p)
    }
}

/// Records every command and answers from rules.
///
/// Rules match on program name plus a leading argument prefix; the first
/// rule added wins. Unmatched commands succeed with empty output.
#[derive(Default)]
pub struct ScriptedRunner {
    rules: Vec<Rule>,
    calls: RefCell<Vec<Cmd>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply with a fixed result.
    pub fn on(self, program: &str, prefix: &[&str], result: CommandResult) -> Self {
        self.on_with(program, prefix, move |_| result.clone())
    }

    /// Reply with whatever `handler` computes.
    pub fn on_with(
        mut self,
        program: &str,
        prefix: &[&str],
        handler: impl Fn(&Cmd) -> CommandResult + 'static,
    ) -> Self {
        self.rules.push(Rule {
            program: program.to_string(),
            prefix: prefix.iter().map(|s| s.to_string()).collect(),
            handler: Box::new(handler),
        });
        self
    }

    /// Reply with exit code 1 and `stderr`.
    pub fn fail(self, program: &str, prefix: &[&str], stderr: &str) -> Self {
        self.on(program, prefix, CommandResult::new(1, "", stderr))
    }

    /// Answer the queries the pipeline makes about an 8 GiB `/dev/sdb`.
    pub fn usb_stick(self) -> Self {
        self.on(
            "blockdev",
            &["--getsize64", "/dev/sdb"],
            CommandResult::ok(format!("{}\n", STICK_BYTES)),
        )
        .on(
            "lsblk",
            &["-n", "-b", "-o", "SIZE,VENDOR,MODEL,RM", "/dev/sdb"],
            CommandResult::ok(format!("{} SanDisk Cruzer 1\n", STICK_BYTES)),
        )
        .on(
            "lsblk",
            &["-n", "-o", "SIZE,FSTYPE,LABEL", "/dev/sdb1"],
            CommandResult::ok("  700M vfat   USBBOOT\n"),
        )
        .on(
            "lsblk",
            &["-n", "-o", "SIZE,FSTYPE,LABEL", "/dev/sdb2"],
            CommandResult::ok("  7.2G ext4   persistence\n"),
        )
    }

    /// Back `mount`/`umount` with a [`FakeMounts`] table.
    pub fn with_fake_mounts(self, mounts: &Rc<FakeMounts>) -> Self {
        let on_mount = Rc::clone(mounts);
        let on_umount = Rc::clone(mounts);
        self.on_with("mount", &[], move |cmd| on_mount.mount(cmd))
            .on_with("umount", &[], move |cmd| on_umount.umount(cmd))
    }

    pub fn calls(&self) -> Vec<Cmd> {
        self.calls.borrow().clone()
    }

    /// Every recorded command as `program arg..`.
    pub fn argvs(&self) -> Vec<Vec<String>> {
        self.calls
            .borrow()
            .iter()
            .map(|c| c.argv().into_iter().map(str::to_string).collect())
            .collect()
    }

    /// Argument lists of every call to `program`, in order.
    pub fn calls_to(&self, program: &str) -> Vec<Vec<String>> {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.program() == program)
            .map(|c| c.get_args().to_vec())
            .collect()
    }

    pub fn ran(&self, program: &str) -> bool {
        self.calls.borrow().iter().any(|c| c.program() == program)
    }

    /// Index of the first call whose argv starts with `argv`.
    pub fn position(&self, argv: &[&str]) -> Option<usize> {
        self.argvs().iter().position(|call| {
            call.len() >= argv.len() && call.iter().zip(argv).all(|(a, b)| a == b)
        })
    }
}

impl CommandRunner for ScriptedRunner {
    fn execute(&self, cmd: &Cmd) -> Result<CommandResult> {
        self.calls.borrow_mut().push(cmd.clone());
        let reply = self
            .rules
            .iter()
            .find(|rule| rule.matches(cmd))
            .map(|rule| (rule.handler)(cmd))
            .unwrap_or_else(|| CommandResult::ok(""));
        Ok(reply)
    }
}

/// Simulated partitions: each device has a backing directory whose
/// contents are copied onto the mount point at `mount` and copied back at
/// `umount`, so data written through one mount is visible to the next.
pub struct FakeMounts {
    root: TempDir,
    mounted: RefCell<HashMap<PathBuf, PathBuf>>,
    /// Output of a bare `mount`.
    table: String,
}

impl FakeMounts {
    pub fn new() -> Rc<Self> {
        Self::with_table("")
    }

    pub fn with_table(table: &str) -> Rc<Self> {
        Rc::new(Self {
            root: TempDir::new().expect("Failed to create temp dir"),
            mounted: RefCell::new(HashMap::new()),
            table: table.to_string(),
        })
    }

    /// Directory holding the contents of `device`.
    pub fn backing(&self, device: &str) -> PathBuf {
        self.root.path().join(device.trim_start_matches('/').replace('/', "_"))
    }

    fn mount(&self, cmd: &Cmd) -> CommandResult {
        let args = cmd.get_args();
        if args.is_empty() {
            return CommandResult::ok(self.table.clone());
        }
        let (device, target) = (&args[0], PathBuf::from(&args[1]));
        let backing = self.backing(device);
        fs::create_dir_all(&backing).expect("Failed to create backing dir");
        copy_tree(&backing, &target);
        self.mounted.borrow_mut().insert(target, backing);
        CommandResult::ok("")
    }

    fn umount(&self, cmd: &Cmd) -> CommandResult {
        let target = PathBuf::from(&cmd.get_args()[0]);
        if let Some(backing) = self.mounted.borrow_mut().remove(&target) {
            fs::remove_dir_all(&backing).expect("Failed to clear backing dir");
            fs::create_dir_all(&backing).expect("Failed to create backing dir");
            copy_tree(&target, &backing);
            clear_dir(&target);
        }
        CommandResult::ok("")
    }

    pub fn mounted_count(&self) -> usize {
        self.mounted.borrow().len()
    }
}

fn copy_tree(from: &Path, to: &Path) {
    for entry in WalkDir::new(from).min_depth(1) {
        let entry = entry.expect("Failed to walk dir");
        let rel = entry.path().strip_prefix(from).expect("Entry outside walked dir");
        let dest = to.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest).expect("Failed to create dir");
        } else {
            fs::copy(entry.path(), &dest).expect("Failed to copy file");
        }
    }
}

/// Remove everything under `dir`, keeping `dir` itself.
fn clear_dir(dir: &Path) {
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.expect("Failed to walk dir");
        if entry.file_type().is_dir() {
            fs::remove_dir_all(entry.path()).expect("Failed to clear mount dir");
        } else {
            fs::remove_file(entry.path()).expect("Failed to clear mount dir");
        }
    }
}

/// Temporary image files and fake device nodes.
pub struct TestEnv {
    /// Temporary directory (kept alive for lifetime of TestEnv)
    pub _temp_dir: TempDir,
    pub base_dir: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let base_dir = temp_dir.path().to_path_buf();
        Self {
            _temp_dir: temp_dir,
            base_dir,
        }
    }

    /// A sparse image of `len` bytes.
    pub fn sparse_image(&self, name: &str, len: u64) -> PathBuf {
        let path = self.base_dir.join(name);
        let file = fs::File::create(&path).expect("Failed to create image");
        file.set_len(len).expect("Failed to size image");
        path
    }

    /// A small image with known contents.
    pub fn image_with(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.base_dir.join(name);
        fs::write(&path, contents).expect("Failed to write image");
        path
    }

    /// A regular file standing in for a whole-disk device node.
    pub fn device_node(&self, name: &str) -> String {
        let path = self.base_dir.join(name);
        fs::write(&path, b"").expect("Failed to create device node");
        path.to_string_lossy().into_owned()
    }
}

/// Linux options with no settle delay.
pub fn linux_options(persistence: bool) -> FlashOptions {
    FlashOptions {
        persistence,
        platform: Platform::Linux,
        settle_attempts: 2,
        settle_delay: Duration::ZERO,
        ..FlashOptions::default()
    }
}
