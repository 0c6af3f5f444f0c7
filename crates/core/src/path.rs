// SPDX-License-Identifier: MIT

//! Input validation for paths and names arriving over the control surface.

use std::path::{Path, PathBuf};

use crate::error::{Error, ErrorKind};

/// Validate a working directory supplied to `new`: must be absolute and
/// free of NUL bytes. Existence is checked later by the window spawn so the
/// error can name the multiplexer failure.
pub fn validate_cwd(raw: &str) -> Result<PathBuf, Error> {
    if raw.is_empty() || raw.contains('\0') {
        return Err(Error::with(ErrorKind::BadRequest, "invalid working directory"));
    }
    let path = Path::new(raw);
    if !path.is_absolute() {
        return Err(Error::with(
            ErrorKind::BadRequest,
            format!("working directory must be absolute: {raw}"),
        ));
    }
    Ok(path.to_path_buf())
}

/// Role and task names: `[A-Za-z0-9_-]{1,64}`.
pub fn validate_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 64
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

#[cfg(test)]
#[path = "path_tests.rs"]
mod tests;
