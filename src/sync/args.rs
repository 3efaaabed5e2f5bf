//! Transfer tool argument construction
//!
//! Pure function of the volume's sync settings; no I/O.

use crate::volume::OpMode;
use std::path::Path;

/// Flag that overrides the remote shell used by the transfer tool
pub const REMOTE_SHELL_FLAG: &str = "-e";

/// Remote shell used when a key file is configured
///
/// Host keys are neither verified nor recorded, and ssh logging is silenced.
const SSH_COMMAND: &str =
    "ssh -o StrictHostKeyChecking=no -o UserKnownHostsFile=/dev/null -o LogLevel=quiet -i";

/// Remote shell command embedding `key`
pub fn ssh_command(key: &Path) -> String {
    format!("{} {}", SSH_COMMAND, key.display())
}

/// Build the ordered argument list for one transfer
///
/// `delete` implies `--recursive`; `--recursive` is emitted at most once.
/// The source gets a trailing separator so the directory's contents are
/// copied rather than the directory itself.
pub fn build_args(opmode: &OpMode, sshkey: Option<&Path>, source: &Path, target: &str) -> Vec<String> {
    let mut args = Vec::new();

    if opmode.archive {
        args.push("--archive".to_string());
    }
    if opmode.compress {
        args.push("--compress".to_string());
    }
    if opmode.delete {
        args.push("--delete".to_string());
        args.push("--recursive".to_string());
    } else if opmode.recursive {
        args.push("--recursive".to_string());
    }

    if let Some(key) = sshkey {
        args.push(REMOTE_SHELL_FLAG.to_string());
        args.push(ssh_command(key));
    }

    let source = source.display().to_string();
    args.push(format!("{}/", source.trim_end_matches('/')));
    args.push(target.to_string());

    args
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mode(flags: &str) -> OpMode {
        flags.parse().unwrap()
    }

    #[test]
    fn archive_compress_delete() {
        let args = build_args(
            &mode("archive,compress,delete"),
            None,
            Path::new("/r/v1"),
            "/backup/v1",
        );
        assert_eq!(
            args,
            ["--archive", "--compress", "--delete", "--recursive", "/r/v1/", "/backup/v1"]
        );
    }

    #[test]
    fn recursive_never_duplicated() {
        let flags = ["archive", "compress", "delete", "recursive"];
        for bits in 0..16u8 {
            let selected: Vec<&str> = flags
                .iter()
                .enumerate()
                .filter(|(i, _)| bits & (1 << i) != 0)
                .map(|(_, f)| *f)
                .collect();
            let opmode = mode(&selected.join(","));
            let args = build_args(&opmode, None, Path::new("/s"), "/d");

            let recursive = args.iter().filter(|a| *a == "--recursive").count();
            let expected = usize::from(opmode.delete || opmode.recursive);
            assert_eq!(recursive, expected, "opmode {}", opmode);
        }
    }

    #[test]
    fn empty_mode_only_paths() {
        let args = build_args(&OpMode::default(), None, Path::new("/s/"), "host:/d");
        assert_eq!(args, ["/s/", "host:/d"]);
    }

    #[test]
    fn key_file_adds_remote_shell() {
        let args = build_args(
            &mode("recursive"),
            Some(Path::new("/keys/id_ed25519")),
            Path::new("/r/v1"),
            "backup@host:/srv/v1",
        );

        let pos = args.iter().position(|a| a == REMOTE_SHELL_FLAG).unwrap();
        assert_eq!(
            args[pos + 1],
            "ssh -o StrictHostKeyChecking=no -o UserKnownHostsFile=/dev/null -o LogLevel=quiet -i /keys/id_ed25519"
        );
        assert_eq!(&args[pos + 2..], ["/r/v1/", "backup@host:/srv/v1"]);
    }
}
