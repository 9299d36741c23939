use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::bail;
use tracing::{debug, warn};

pub const DEFAULT_KEY_FILE: &str = "key.txt";
pub const API_KEY_ENV: &str = "SMARTSHEET_API_KEY";

/// First non-empty key from: the flag, the named key file, `./key.txt`,
/// `SMARTSHEET_API_KEY`, then an interactive prompt.
pub fn resolve_api_key(flag: Option<String>, keyfile: Option<&Path>) -> anyhow::Result<String> {
    if let Some(key) = flag.as_deref().and_then(non_empty) {
        return Ok(key);
    }
    if let Some(path) = keyfile {
        let path = keyfile_path(path);
        match read_key_file(&path) {
            Some(key) => return Ok(key),
            None => warn!(path = %path.display(), "key file missing or empty"),
        }
    }
    if let Some(key) = read_key_file(Path::new(DEFAULT_KEY_FILE)) {
        debug!("using api key from {DEFAULT_KEY_FILE}");
        return Ok(key);
    }
    if let Some(key) = std::env::var(API_KEY_ENV).ok().as_deref().and_then(non_empty) {
        return Ok(key);
    }
    prompt_for_key(std::io::stdin().lock(), std::io::stderr())
}

/// Key files are plain `.txt`; the extension may be left off.
pub fn keyfile_path(path: &Path) -> PathBuf {
    if path.extension().is_some_and(|ext| ext == "txt") {
        path.to_path_buf()
    } else {
        let mut name = path.as_os_str().to_owned();
        name.push(".txt");
        PathBuf::from(name)
    }
}

pub fn read_key_file(path: &Path) -> Option<String> {
    std::fs::read_to_string(path).ok().as_deref().and_then(non_empty)
}

fn prompt_for_key(mut input: impl BufRead, mut output: impl Write) -> anyhow::Result<String> {
    write!(output, "Enter API key: ")?;
    output.flush()?;
    let mut line = String::new();
    input.read_line(&mut line)?;
    match non_empty(&line) {
        Some(key) => Ok(key),
        None => bail!("no API key provided"),
    }
}

fn non_empty(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn keyfile_gets_txt_extension_when_missing() {
        assert_eq!(keyfile_path(Path::new("secrets/api")), PathBuf::from("secrets/api.txt"));
        assert_eq!(keyfile_path(Path::new("api.txt")), PathBuf::from("api.txt"));
    }

    #[test]
    fn flag_wins_over_key_file() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("api.txt");
        std::fs::write(&path, "from-file\n").expect("write");
        assert_eq!(
            resolve_api_key(Some(" from-flag ".into()), Some(&path)).expect("key"),
            "from-flag"
        );
        assert_eq!(resolve_api_key(None, Some(&path)).expect("key"), "from-file");
    }

    #[test]
    fn blank_key_file_is_ignored() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("blank.txt");
        std::fs::write(&path, "  \n").expect("write");
        assert_eq!(read_key_file(&path), None);
        assert_eq!(read_key_file(&dir.path().join("missing.txt")), None);
    }

    #[test]
    fn prompt_reads_one_trimmed_line() {
        let mut shown = Vec::new();
        let key = prompt_for_key("  typed-key  \nignored\n".as_bytes(), &mut shown).expect("key");
        assert_eq!(key, "typed-key");
        assert_eq!(String::from_utf8(shown).expect("utf8"), "Enter API key: ");
        assert!(prompt_for_key("\n".as_bytes(), Vec::new()).is_err());
    }
}
