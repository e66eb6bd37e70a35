//! crates/recall_core/src/validation.rs
//!
//! Ordered, fail-fast checks that run before a mutation reaches storage.
//!
//! A pipeline is composed once, at service construction, from small named
//! check functions. Creation and partial update get separate pipelines that
//! share the same check functions: on update an empty password means
//! "leave it unchanged", on create it is an error.

use tracing::debug;
use url::Url;
use uuid::Uuid;

use crate::credentials::MIN_PASSWORD_CHARS;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ValidationError {
    message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

type CheckFn<T> = Box<dyn Fn(&mut T) -> Result<(), ValidationError> + Send + Sync>;

/// A named sequence of checks over `T`. Checks may normalize the value.
pub struct ValidationPipeline<T> {
    checks: Vec<(&'static str, CheckFn<T>)>,
}

impl<T> Default for ValidationPipeline<T> {
    fn default() -> Self {
        Self { checks: Vec::new() }
    }
}

impl<T> ValidationPipeline<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a check; checks run in the order they were added.
    pub fn check<F>(mut self, name: &'static str, f: F) -> Self
    where
        F: Fn(&mut T) -> Result<(), ValidationError> + Send + Sync + 'static,
    {
        self.checks.push((name, Box::new(f)));
        self
    }

    /// Runs every check in order and stops at the first failure.
    pub fn run(&self, value: &mut T) -> Result<(), ValidationError> {
        for (name, check) in &self.checks {
            if let Err(e) = check(value) {
                debug!(check = name, "validation failed: {}", e);
                return Err(e);
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }
}

//=========================================================================================
// User checks
//=========================================================================================

/// Account input as typed by the user, before hashing.
#[derive(Debug, Clone, Default)]
pub struct UserDraft {
    pub name: String,
    pub email: String,
    /// Raw password; empty on update means "unchanged".
    pub password: String,
}

pub fn password_required(user: &mut UserDraft) -> Result<(), ValidationError> {
    if user.password.is_empty() {
        return Err(ValidationError::new("password is required"));
    }
    Ok(())
}

pub fn password_length(user: &mut UserDraft) -> Result<(), ValidationError> {
    if user.password.is_empty() {
        return Ok(());
    }
    if user.password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(ValidationError::new(format!(
            "password must be at least {MIN_PASSWORD_CHARS} characters long"
        )));
    }
    Ok(())
}

pub fn normalize_email(user: &mut UserDraft) -> Result<(), ValidationError> {
    user.email = normalized_email(&user.email);
    Ok(())
}

pub fn email_required(user: &mut UserDraft) -> Result<(), ValidationError> {
    if user.email.is_empty() {
        return Err(ValidationError::new("email is required"));
    }
    Ok(())
}

pub fn email_format(user: &mut UserDraft) -> Result<(), ValidationError> {
    if user.email.is_empty() {
        return Ok(());
    }
    if !looks_like_email(&user.email) {
        return Err(ValidationError::new("email is not a valid format"));
    }
    Ok(())
}

/// Lowercased and trimmed, the form emails are stored and looked up in.
pub fn normalized_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn looks_like_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && !domain.contains('@')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
}

pub fn user_create_checks() -> ValidationPipeline<UserDraft> {
    ValidationPipeline::new()
        .check("password_required", password_required)
        .check("password_length", password_length)
        .check("normalize_email", normalize_email)
        .check("email_required", email_required)
        .check("email_format", email_format)
}

pub fn user_update_checks() -> ValidationPipeline<UserDraft> {
    ValidationPipeline::new()
        .check("password_length", password_length)
        .check("normalize_email", normalize_email)
        .check("email_required", email_required)
        .check("email_format", email_format)
}

//=========================================================================================
// Problem checks
//=========================================================================================

/// Editable problem fields plus the owner.
#[derive(Debug, Clone, Default)]
pub struct ProblemDraft {
    pub owner_id: Uuid,
    pub title: String,
    pub link: String,
    pub approach: String,
    pub code: String,
    pub language: String,
}

pub fn owner_required(problem: &mut ProblemDraft) -> Result<(), ValidationError> {
    if problem.owner_id.is_nil() {
        return Err(ValidationError::new("a user ID is required"));
    }
    Ok(())
}

pub fn title_required(problem: &mut ProblemDraft) -> Result<(), ValidationError> {
    if problem.title.trim().is_empty() {
        return Err(ValidationError::new("a title is required"));
    }
    Ok(())
}

pub fn link_required(problem: &mut ProblemDraft) -> Result<(), ValidationError> {
    problem.link = problem.link.trim().to_string();
    if problem.link.is_empty() {
        return Err(ValidationError::new("a link is required"));
    }
    Ok(())
}

pub fn link_format(problem: &mut ProblemDraft) -> Result<(), ValidationError> {
    if problem.link.is_empty() {
        return Ok(());
    }
    match Url::parse(&problem.link) {
        Ok(url) if !url.cannot_be_a_base() => Ok(()),
        _ => Err(ValidationError::new("the provided link is not a valid URL")),
    }
}

pub fn problem_create_checks() -> ValidationPipeline<ProblemDraft> {
    ValidationPipeline::new()
        .check("owner_required", owner_required)
        .check("title_required", title_required)
        .check("link_required", link_required)
        .check("link_format", link_format)
}

/// The owner never changes on update, so only the editable fields are checked.
pub fn problem_update_checks() -> ValidationPipeline<ProblemDraft> {
    ValidationPipeline::new()
        .check("title_required", title_required)
        .check("link_required", link_required)
        .check("link_format", link_format)
}
