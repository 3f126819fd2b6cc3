use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// One installed runtime build, as discovered in the install root.
///
/// Two versions are equal when they were read from the same directory name,
/// so `8.2.12` and `php-8.2.12` are distinct entries even though they compare
/// as the same release when sorting.
#[derive(Debug, Clone)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub suffix: Option<String>,
    identifier: String,
}

impl Version {
    #[must_use]
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
            suffix: None,
            identifier: format!("{major}.{minor}.{patch}"),
        }
    }

    /// Name of the directory this version was discovered in.
    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.identifier == other.identifier
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identifier.hash(state);
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
            .then(self.patch.cmp(&other.patch))
            .then_with(|| self.suffix.cmp(&other.suffix))
            .then_with(|| self.identifier.cmp(&other.identifier))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(suffix) = &self.suffix {
            write!(f, "-{suffix}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionComponent {
    Major,
    Minor,
    Patch,
}

impl fmt::Display for VersionComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Major => write!(f, "major"),
            Self::Minor => write!(f, "minor"),
            Self::Patch => write!(f, "patch"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionParseError {
    #[error("Expected X.Y.Z format, got: {input}")]
    InvalidFormat { input: String },
    #[error("Invalid {component} version: {value}")]
    InvalidComponent {
        component: VersionComponent,
        value: String,
    },
}

fn parse_component(
    value: Option<&str>,
    component: VersionComponent,
    input: &str,
) -> Result<u32, VersionParseError> {
    let value = value.ok_or_else(|| VersionParseError::InvalidFormat {
        input: input.to_string(),
    })?;
    value
        .parse()
        .map_err(|_| VersionParseError::InvalidComponent {
            component,
            value: value.to_string(),
        })
}

impl FromStr for Version {
    type Err = VersionParseError;

    /// Parses a directory name as-is; names containing whitespace or control
    /// characters are rejected.
    fn from_str(identifier: &str) -> Result<Self, Self::Err> {
        if identifier.is_empty()
            || identifier
                .chars()
                .any(|c| c.is_whitespace() || c.is_control())
        {
            return Err(VersionParseError::InvalidFormat {
                input: identifier.to_string(),
            });
        }

        let body = identifier
            .strip_prefix("php-")
            .or_else(|| identifier.strip_prefix('v'))
            .unwrap_or(identifier);

        let (numbers, suffix) = match body.split_once('-') {
            Some((numbers, suffix)) if !suffix.is_empty() => (numbers, Some(suffix.to_string())),
            Some(_) => {
                return Err(VersionParseError::InvalidFormat {
                    input: identifier.to_string(),
                });
            }
            None => (body, None),
        };

        let mut parts = numbers.split('.');
        let major = parse_component(parts.next(), VersionComponent::Major, identifier)?;
        let minor = parse_component(parts.next(), VersionComponent::Minor, identifier)?;
        let patch = parse_component(parts.next(), VersionComponent::Patch, identifier)?;
        if parts.next().is_some() {
            return Err(VersionParseError::InvalidFormat {
                input: identifier.to_string(),
            });
        }

        Ok(Self {
            major,
            minor,
            patch,
            suffix,
            identifier: identifier.to_string(),
        })
    }
}
