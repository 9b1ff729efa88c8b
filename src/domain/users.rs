//! Account field rules shared by registration, profile edits and password resets.

use url::Url;

use crate::domain::error::ValidationErrors;

pub const EMAIL_MAX_LEN: usize = 255;
pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 50;
pub const FULL_NAME_MAX_LEN: usize = 100;
pub const PASSWORD_MIN_LEN: usize = 8;
pub const PASSWORD_MAX_LEN: usize = 100;
const PROFILE_FIELD_MAX_LEN: usize = 255;

/// Registration input as received from the client.
#[derive(Debug, Clone, Copy)]
pub struct Registration<'a> {
    pub email: &'a str,
    pub username: &'a str,
    pub full_name: Option<&'a str>,
    pub password: &'a str,
    pub confirm_password: &'a str,
}

/// Profile fields a user may change about themselves.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProfileChanges<'a> {
    pub full_name: Option<&'a str>,
    pub bio: Option<&'a str>,
    pub avatar_url: Option<&'a str>,
    pub website: Option<&'a str>,
    pub location: Option<&'a str>,
    pub company: Option<&'a str>,
}

/// Trim and lowercase so lookups are case-insensitive.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

pub fn is_valid_email(email: &str) -> bool {
    if email.is_empty() || email.len() > EMAIL_MAX_LEN || email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2
        && labels
            .iter()
            .all(|label| !label.is_empty() && !label.starts_with('-') && !label.ends_with('-'))
}

pub fn validate_registration(input: &Registration<'_>) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();

    errors.ensure(
        is_valid_email(&normalize_email(input.email)),
        "email",
        "format",
        "value is not a valid email address",
    );
    check_username(&mut errors, input.username);
    if let Some(full_name) = input.full_name {
        check_full_name(&mut errors, full_name);
    }
    check_new_password(
        &mut errors,
        "password",
        "confirm_password",
        input.password,
        input.confirm_password,
    );

    errors.into_result()
}

/// Rules for a password being set, with its confirmation.
pub fn check_new_password(
    errors: &mut ValidationErrors,
    field: &'static str,
    confirm_field: &'static str,
    password: &str,
    confirm: &str,
) {
    let len = password.chars().count();
    errors.ensure(
        len >= PASSWORD_MIN_LEN,
        field,
        "length",
        "Password must be at least 8 characters",
    );
    errors.ensure(
        len <= PASSWORD_MAX_LEN,
        field,
        "length",
        "Password must be at most 100 characters",
    );
    errors.ensure(
        password == confirm,
        confirm_field,
        "mismatch",
        "Passwords do not match",
    );
}

pub fn validate_profile_changes(changes: &ProfileChanges<'_>) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();

    if let Some(full_name) = changes.full_name {
        check_full_name(&mut errors, full_name);
    }
    if let Some(bio) = changes.bio {
        errors.ensure(
            bio.chars().count() <= 2000,
            "bio",
            "length",
            "Bio must be at most 2000 characters",
        );
    }
    for (field, value) in [
        ("avatar_url", changes.avatar_url),
        ("website", changes.website),
    ] {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            errors.ensure(is_http_url(value), field, "format", "Must be an http(s) URL");
        }
    }
    for (field, value) in [
        ("location", changes.location),
        ("company", changes.company),
    ] {
        if let Some(value) = value {
            errors.ensure(
                value.chars().count() <= PROFILE_FIELD_MAX_LEN,
                field,
                "length",
                "Must be at most 255 characters",
            );
        }
    }

    errors.into_result()
}

fn check_username(errors: &mut ValidationErrors, username: &str) {
    let len = username.chars().count();
    errors.ensure(
        (USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&len),
        "username",
        "length",
        "Username must be between 3 and 50 characters",
    );
    errors.ensure(
        username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_'),
        "username",
        "format",
        "Username can only contain letters, numbers, and underscores",
    );
}

fn check_full_name(errors: &mut ValidationErrors, full_name: &str) {
    errors.ensure(
        full_name.chars().count() <= FULL_NAME_MAX_LEN,
        "full_name",
        "length",
        "Full name must be at most 100 characters",
    );
}

fn is_http_url(value: &str) -> bool {
    Url::parse(value)
        .map(|url| matches!(url.scheme(), "http" | "https") && url.host().is_some())
        .unwrap_or(false)
}
