pub mod file;
pub mod stdin;

use serde::de::DeserializeOwned;

/// Load the primary document from `--input`, falling back to piped stdin.
pub fn load<T: DeserializeOwned>(
    path: Option<&str>,
    what: &str,
) -> Result<T, Box<dyn std::error::Error>> {
    if let Some(path) = path {
        return file::read_typed(path);
    }
    match stdin::read_stdin()? {
        Some(value) => Ok(serde_json::from_value(value)?),
        None => Err(format!("{what} required: pass --input <file> or pipe JSON on stdin").into()),
    }
}
