//! Registration input checks

use crate::error::{Error, Result};

pub const USERNAME_MIN_LEN: usize = 5;
pub const USERNAME_MAX_LEN: usize = 16;
pub const MIN_AGE: i64 = 6;
pub const MAX_AGE: i64 = 114;

/// Lowercase letter first, then lowercase letters, digits, `_` or `-`; 5 to 16 chars.
pub fn validate_username(username: &str) -> Result<()> {
    let mut chars = username.chars();
    let first_ok = chars.next().is_some_and(|c| c.is_ascii_lowercase());
    let rest_ok =
        chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');
    let len = username.chars().count();

    if first_ok && rest_ok && (USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&len) {
        Ok(())
    } else {
        Err(Error::validation(format!(
            "username must be {USERNAME_MIN_LEN}-{USERNAME_MAX_LEN} characters of a-z, 0-9, _ or -, starting with a letter"
        )))
    }
}

pub fn validate_age(age: i64) -> Result<()> {
    if (MIN_AGE..=MAX_AGE).contains(&age) {
        Ok(())
    } else {
        Err(Error::validation(format!(
            "age must be between {MIN_AGE} and {MAX_AGE}"
        )))
    }
}

/// Shape check only: `local@domain.tld`, no whitespace.
pub fn validate_email(email: &str) -> Result<()> {
    let shaped = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain
                    .split_once('.')
                    .is_some_and(|(host, _)| !host.is_empty())
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };

    if shaped {
        Ok(())
    } else {
        Err(Error::validation("email address is malformed"))
    }
}

pub fn validate_password(password: &str) -> Result<()> {
    if password.is_empty() {
        return Err(Error::validation("password must not be empty"));
    }
    Ok(())
}
