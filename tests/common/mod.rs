// Shared helpers: stand-in mkslides executables written as shell scripts.
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Accepts the mkslides build CLI, writes a small site, and records the
/// config file and working directory it was given.
pub const FAKE_MKSLIDES: &str = r#"#!/bin/sh
out=""
cfg=""
md=""
strict=0
while [ $# -gt 0 ]; do
  case "$1" in
    build) shift ;;
    -d) out="$2"; shift 2 ;;
    -f) cfg="$2"; shift 2 ;;
    --strict) strict=1; shift ;;
    *) md="$1"; shift ;;
  esac
done
if [ ! -f "$md" ]; then echo "ERROR - markdown file not found: $md" >&2; exit 2; fi
if [ ! -f "$cfg" ]; then echo "ERROR - config file not found: $cfg" >&2; exit 2; fi
if [ "$strict" = 1 ] && grep -q "missing.png" "$md"; then
  echo "WARNING - image 'missing.png' not found" >&2
  echo "Aborted with 1 warnings in strict mode!" >&2
  exit 1
fi
mkdir -p "$out/assets"
{ echo "<html><body>"; cat "$md"; echo "</body></html>"; } > "$out/index.html"
echo "body {}" > "$out/assets/theme.css"
cp "$cfg" "$out/used-config.yml"
pwd > "$out/cwd.txt"
echo "INFO - Documentation built in $out"
"#;

/// Never finishes on its own
pub const HANGING_MKSLIDES: &str = "#!/bin/sh\nexec sleep 30\n";

/// Always fails the build with a diagnostic
pub const FAILING_MKSLIDES: &str = "#!/bin/sh\necho \"ERROR - Config value 'slides': unknown theme\" >&2\nexit 3\n";

/// Write an executable script into `dir` and return its path
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, body).expect("Failed to write script");

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(&path).expect("Failed to stat script").permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).expect("Failed to chmod script");
    }

    path
}

/// Scratch area for one test: a bin dir, a workspace root and an output dir
pub struct Sandbox {
    pub dir: TempDir,
}

impl Sandbox {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        fs::create_dir(dir.path().join("bin")).expect("Failed to create bin dir");
        fs::create_dir(dir.path().join("work")).expect("Failed to create work dir");
        Self { dir }
    }

    pub fn tool(&self, body: &str) -> String {
        write_script(&self.dir.path().join("bin"), "mkslides", body)
            .to_string_lossy()
            .into_owned()
    }

    pub fn work_root(&self) -> PathBuf {
        self.dir.path().join("work")
    }

    pub fn output_dir(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Everything left behind in the workspace root
    pub fn leftover_workspaces(&self) -> Vec<PathBuf> {
        fs::read_dir(self.work_root())
            .expect("Failed to read work dir")
            .map(|entry| entry.expect("Failed to read entry").path())
            .collect()
    }
}
