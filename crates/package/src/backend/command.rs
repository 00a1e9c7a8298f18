use super::Packer;
use crate::error::{ErrorKind, Result};
use crate::platform::Platform;
use exn::ResultExt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::instrument;

/// Drives an external pack/unpack tool.
///
/// Each operation is an argument template whose first element is the
/// program. The placeholders `{input}`, `{output}`, `{platform}` and
/// `{version}` are substituted before the tool is started.
#[derive(Debug, Clone)]
pub struct CommandPacker {
    unpack: Vec<String>,
    pack: Vec<String>,
}

impl CommandPacker {
    pub fn new(unpack: Vec<String>, pack: Vec<String>) -> Self {
        Self { unpack, pack }
    }

    fn execute(&self, template: &[String], input: &Path, output: &Path, platform: Platform) -> Result<()> {
        let Some((program, args)) = template.split_first() else {
            exn::bail!(ErrorKind::PackerNotConfigured);
        };
        let resolved = which::which(program).or_raise(|| ErrorKind::PackerNotFound(program.clone()))?;
        let args: Vec<String> = args.iter().map(|arg| substitute(arg, input, output, platform)).collect();
        tracing::debug!(program = %resolved.display(), ?args, "Running container packer");
        let result = Command::new(&resolved)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .or_raise(|| ErrorKind::Io)?;
        if !result.status.success() {
            tracing::error!(
                code = ?result.status.code(),
                stdout = %String::from_utf8_lossy(&result.stdout).trim_end(),
                stderr = %String::from_utf8_lossy(&result.stderr).trim_end(),
                "Container packer failed"
            );
            exn::bail!(ErrorKind::PackerFailed(result.status.code()));
        }
        Ok(())
    }
}

fn substitute(arg: &str, input: &Path, output: &Path, platform: Platform) -> String {
    arg.replace("{input}", &input.to_string_lossy())
        .replace("{output}", &output.to_string_lossy())
        .replace("{platform}", platform.family_name())
        .replace("{version}", platform.version_name())
}

/// Unpackers commonly extract into a single directory named after the
/// container; if that is all there is, it is the real root.
fn content_root(destination: &Path) -> Result<PathBuf> {
    let mut entries = fs::read_dir(destination).or_raise(|| ErrorKind::Io)?;
    match (entries.next(), entries.next()) {
        (Some(only), None) => {
            let only = only.or_raise(|| ErrorKind::Io)?;
            match only.file_type().or_raise(|| ErrorKind::Io)?.is_dir() {
                true => Ok(only.path()),
                false => Ok(destination.to_path_buf()),
            }
        },
        _ => Ok(destination.to_path_buf()),
    }
}

impl Packer for CommandPacker {
    #[instrument(skip(self), fields(container = %container.display()))]
    fn unpack(&self, container: &Path, destination: &Path, platform: Platform) -> Result<PathBuf> {
        self.execute(&self.unpack, container, destination, platform)?;
        content_root(destination)
    }

    #[instrument(skip(self), fields(destination = %destination.display()))]
    fn pack(&self, source: &Path, destination: &Path, platform: Platform) -> Result<()> {
        self.execute(&self.pack, source, destination, platform)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{GameVersion, PlatformFamily};
    use std::ops::Deref;

    const PC: Platform = Platform::new(PlatformFamily::Pc, GameVersion::Rs2014);

    fn owned(args: &[&str]) -> Vec<String> {
        args.iter().map(|a| a.to_string()).collect()
    }

    #[test]
    fn placeholders_are_substituted() {
        let arg = substitute("--in={input} --out={output} -p {platform} -v {version}", Path::new("/a.psarc"), Path::new("/tmp/x"), PC);
        assert_eq!(arg, "--in=/a.psarc --out=/tmp/x -p Pc -v RS2014");
    }

    #[test]
    fn empty_template_is_not_configured() {
        let packer = CommandPacker::new(vec![], vec![]);
        let err = packer.pack(Path::new("in"), Path::new("out"), PC).unwrap_err();
        assert!(matches!(err.deref(), ErrorKind::PackerNotConfigured));
    }

    #[test]
    fn missing_program_is_reported() {
        let packer = CommandPacker::new(owned(&["definitely-not-a-packer-binary"]), vec![]);
        let dir = tempfile::tempdir().unwrap();
        let err = packer.unpack(Path::new("a.psarc"), dir.path(), PC).unwrap_err();
        assert!(matches!(err.deref(), ErrorKind::PackerNotFound(_)));
    }

    #[cfg(unix)]
    #[test]
    fn unpack_finds_single_directory_root() {
        let dir = tempfile::tempdir().unwrap();
        let container = dir.path().join("song_p.psarc");
        fs::write(&container, "payload").unwrap();
        let destination = dir.path().join("scratch");
        fs::create_dir(&destination).unwrap();
        let script = "mkdir -p \"$1/song_Pc\" && cp \"$0\" \"$1/song_Pc/content\"";
        let packer = CommandPacker::new(owned(&["sh", "-c", script, "{input}", "{output}"]), vec![]);
        let root = packer.unpack(&container, &destination, PC).unwrap();
        assert_eq!(root, destination.join("song_Pc"));
        assert_eq!(fs::read_to_string(root.join("content")).unwrap(), "payload");
    }

    #[cfg(unix)]
    #[test]
    fn failing_tool_reports_exit_code() {
        let packer = CommandPacker::new(vec![], owned(&["sh", "-c", "exit 3"]));
        let err = packer.pack(Path::new("in"), Path::new("out"), PC).unwrap_err();
        assert!(matches!(err.deref(), ErrorKind::PackerFailed(Some(3))));
    }
}
