//! User Record - a lab member owning routines and results

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// User Record represents a person who authors routines and produces results.
///
/// Users are identified by their unique `usr_name`. Every user has a working
/// directory where routine scripts and summaries live.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserRecord {
    id: Option<i64>,
    usr_name: String,
    first_name: Option<String>,
    middle_name: Option<String>,
    last_name: Option<String>,
    e_mail: Option<String>,
    affiliation: Option<String>,
    degree: Option<String>,
    phone: Option<String>,
    working_directory: Option<PathBuf>,
}

impl UserRecord {
    /// Create a minimal user.
    #[must_use]
    pub fn new(usr_name: impl Into<String>) -> Self {
        Self {
            usr_name: usr_name.into(),
            ..Self::default()
        }
    }

    /// Create a builder for a user with profile fields.
    #[must_use]
    pub fn builder(usr_name: impl Into<String>) -> UserRecordBuilder {
        UserRecordBuilder {
            record: Self::new(usr_name),
        }
    }

    /// Database id, once stored.
    #[must_use]
    pub const fn id(&self) -> Option<i64> {
        self.id
    }

    /// Unique user name.
    #[must_use]
    pub fn usr_name(&self) -> &str {
        &self.usr_name
    }

    /// First name.
    #[must_use]
    pub fn first_name(&self) -> Option<&str> {
        self.first_name.as_deref()
    }

    /// Middle name.
    #[must_use]
    pub fn middle_name(&self) -> Option<&str> {
        self.middle_name.as_deref()
    }

    /// Last name.
    #[must_use]
    pub fn last_name(&self) -> Option<&str> {
        self.last_name.as_deref()
    }

    /// E-mail address.
    #[must_use]
    pub fn e_mail(&self) -> Option<&str> {
        self.e_mail.as_deref()
    }

    /// Affiliation.
    #[must_use]
    pub fn affiliation(&self) -> Option<&str> {
        self.affiliation.as_deref()
    }

    /// Academic degree.
    #[must_use]
    pub fn degree(&self) -> Option<&str> {
        self.degree.as_deref()
    }

    /// Phone number.
    #[must_use]
    pub fn phone(&self) -> Option<&str> {
        self.phone.as_deref()
    }

    /// Working directory, if set.
    #[must_use]
    pub fn working_directory(&self) -> Option<&Path> {
        self.working_directory.as_deref()
    }

    pub(crate) const fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    pub(crate) fn set_working_directory(&mut self, dir: PathBuf) {
        self.working_directory = Some(dir);
    }

    /// Set a column by its table name. Unknown columns are ignored and
    /// reported as `false`.
    pub(crate) fn set_column(&mut self, column: &str, value: Option<String>) -> bool {
        if column == "working_directory" {
            self.working_directory = value.map(PathBuf::from);
            return true;
        }
        let slot = match column {
            "first_name" => &mut self.first_name,
            "middle_name" => &mut self.middle_name,
            "last_name" => &mut self.last_name,
            "e_mail" => &mut self.e_mail,
            "affiliation" => &mut self.affiliation,
            "degree" => &mut self.degree,
            "phone" => &mut self.phone,
            _ => return false,
        };
        *slot = value;
        true
    }
}

/// Builder for `UserRecord`.
#[derive(Debug)]
pub struct UserRecordBuilder {
    record: UserRecord,
}

impl UserRecordBuilder {
    /// Set first and last name.
    #[must_use]
    pub fn name(mut self, first: impl Into<String>, last: impl Into<String>) -> Self {
        self.record.first_name = Some(first.into());
        self.record.last_name = Some(last.into());
        self
    }

    /// Set the middle name.
    #[must_use]
    pub fn middle_name(mut self, middle: impl Into<String>) -> Self {
        self.record.middle_name = Some(middle.into());
        self
    }

    /// Set the e-mail address.
    #[must_use]
    pub fn e_mail(mut self, e_mail: impl Into<String>) -> Self {
        self.record.e_mail = Some(e_mail.into());
        self
    }

    /// Set the affiliation.
    #[must_use]
    pub fn affiliation(mut self, affiliation: impl Into<String>) -> Self {
        self.record.affiliation = Some(affiliation.into());
        self
    }

    /// Set the degree.
    #[must_use]
    pub fn degree(mut self, degree: impl Into<String>) -> Self {
        self.record.degree = Some(degree.into());
        self
    }

    /// Set the phone number.
    #[must_use]
    pub fn phone(mut self, phone: impl Into<String>) -> Self {
        self.record.phone = Some(phone.into());
        self
    }

    /// Set the working directory explicitly.
    #[must_use]
    pub fn working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.record.working_directory = Some(dir.into());
        self
    }

    /// Build the `UserRecord`.
    #[must_use]
    pub fn build(self) -> UserRecord {
        self.record
    }
}
