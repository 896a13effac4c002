//! Fake LLVM toolchain for integration tests.
//!
//! The scripts are written once per test binary so no test executes a script
//! while another is still writing one. Request logs live next to each test's
//! own library file (`<lib>.requests`, `<lib>.spawns`, `<lib>.objdump`,
//! `<lib>.pid`).

#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::thread;
use std::time::{Duration, Instant};

use crashsym::config::SessionConfig;
use tempfile::TempDir;

/// Address the fake symbolizer never answers
pub const HANGING_ADDRESS: &str = "0x100";

/// Address the fake symbolizer blocks on for a minute after writing its pid
pub const STUCK_ADDRESS: &str = "0x200";

const FAKE_SYMBOLIZER: &str = r#"#!/bin/sh
for arg in "$@"; do
    case "$arg" in --obj=*) obj="${arg#--obj=}" ;; esac
done
echo spawn >> "$obj.spawns"
while IFS= read -r addr; do
    if [ -z "$addr" ]; then
        echo ""
        continue
    fi
    echo "$addr" >> "$obj.requests"
    case "$addr" in
        0x374e0)
            printf 'inner_helper()\nbionic/libfoo/foo.cpp:12\n'
            printf 'outer_fn()\nbionic/libfoo/foo.cpp:40\n'
            ;;
        0x374d0) printf 'outer_fn()\nbionic/libfoo/foo.cpp:38\n' ;;
        0x100) sleep 5 ;;
        0x200) echo $$ > "$obj.pid"; sleep 60 ;;
        *) printf '??\n??:0\n' ;;
    esac
done
"#;

const FAKE_OBJDUMP: &str = "#!/bin/sh
for last; do :; done
echo \"$*\" >> \"$last.objdump\"
cat <<'EOF'
libfoo.so:\tfile format elf64-littleaarch64

Disassembly of section .text:

00000000000177a0 <thumb_fn()>:
   177a0:\tb510      \tpush\t{r4, lr}
   177b2:\t4604      \tmov\tr4, r0

00000000000374d0 <outer_fn()>:
   374d0:\td10083ff \tsub\tsp, sp, #0x20
   374d4:\ta9017bfd \tstp\tx29, x30, [sp, #16]
   374e0:\t94000000 \tbl\t0x374e0
   374e4:\td65f03c0 \tret
EOF
";

const FAKE_CXXFILT: &str = r#"#!/bin/sh
log="$(dirname "$0")/cxxfilt.requests"
while IFS= read -r name; do
    echo "$name" >> "$log"
    case "$name" in
        _Z3foov) echo "foo()" ;;
        _ZN7android7IBinderD2Ev) echo "android::IBinder::~IBinder()" ;;
        *) echo "$name" ;;
    esac
done
"#;

fn write_script(dir: &Path, name: &str, body: &str) {
    let path = dir.join(name);
    fs::write(&path, body).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
}

/// Directory holding the fake `llvm-symbolizer`, `llvm-objdump` and `llvm-cxxfilt`.
pub fn fake_toolchain() -> &'static Path {
    static DIR: OnceLock<TempDir> = OnceLock::new();
    DIR.get_or_init(|| {
        let dir = tempfile::tempdir().unwrap();
        write_script(dir.path(), "llvm-symbolizer", FAKE_SYMBOLIZER);
        write_script(dir.path(), "llvm-objdump", FAKE_OBJDUMP);
        write_script(dir.path(), "llvm-cxxfilt", FAKE_CXXFILT);
        dir
    })
    .path()
}

/// A symbols mirror containing one library.
pub struct SymbolsMirror {
    pub dir: TempDir,
    pub binary: PathBuf,
}

impl SymbolsMirror {
    pub fn with_library(device_path: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let binary = dir.path().join(device_path.trim_start_matches('/'));
        fs::create_dir_all(binary.parent().unwrap()).unwrap();
        fs::write(&binary, b"\x7fELF").unwrap();
        Self { dir, binary }
    }

    /// Addresses the fake symbolizer was asked about, in order.
    pub fn symbolizer_requests(&self) -> Vec<String> {
        read_lines(&with_suffix(&self.binary, ".requests"))
    }

    /// How many symbolizer processes were started for this library.
    pub fn symbolizer_spawns(&self) -> usize {
        read_lines(&with_suffix(&self.binary, ".spawns")).len()
    }

    /// Argument lines of each disassembler run.
    pub fn objdump_runs(&self) -> Vec<String> {
        read_lines(&with_suffix(&self.binary, ".objdump"))
    }

    /// Pid of the symbolizer stuck on [`STUCK_ADDRESS`], once it got there.
    pub fn stuck_symbolizer_pid(&self) -> u32 {
        let path = with_suffix(&self.binary, ".pid");
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let pid = fs::read_to_string(&path).ok().and_then(|s| s.trim().parse().ok());
            if let Some(pid) = pid {
                return pid;
            }
            assert!(Instant::now() < deadline, "symbolizer never reached {STUCK_ADDRESS}");
            thread::sleep(Duration::from_millis(20));
        }
    }

    pub fn config(&self) -> SessionConfig {
        config_with_toolchain(fake_toolchain(), Some(self.dir.path().to_path_buf()))
    }
}

pub fn config_with_toolchain(toolchain: &Path, symbols_dir: Option<PathBuf>) -> SessionConfig {
    SessionConfig {
        build_top: toolchain.to_path_buf(),
        symbols_dir,
        toolchain_dir: Some(toolchain.to_path_buf()),
        io_timeout: Duration::from_secs(1),
        ..SessionConfig::default()
    }
}

pub fn is_running(pid: u32) -> bool {
    Path::new(&format!("/proc/{pid}")).exists()
}

pub fn cxxfilt_requests() -> Vec<String> {
    read_lines(&fake_toolchain().join("cxxfilt.requests"))
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

fn read_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .map(|s| s.lines().map(str::to_string).collect())
        .unwrap_or_default()
}
