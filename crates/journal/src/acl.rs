//! ACL value transcoders: users, passwords and mount definitions.

use crate::value::Value;
use std::collections::BTreeMap;

/// Password hashing format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PasswordFormat {
    /// Unrecognized format.
    #[default]
    Invalid,
    /// Plain-text password.
    Plain,
    /// SHA-1 hashed password.
    Sha1,
}

impl PasswordFormat {
    /// Canonical name of the format.
    pub fn as_str(&self) -> &'static str {
        match self {
            PasswordFormat::Plain => "PLAIN",
            PasswordFormat::Sha1 => "SHA1",
            PasswordFormat::Invalid => "INVALID",
        }
    }

    /// Parses a format name, ignoring ASCII case.
    pub fn from_str(s: &str) -> Self {
        if s.eq_ignore_ascii_case(PasswordFormat::Plain.as_str()) {
            PasswordFormat::Plain
        } else if s.eq_ignore_ascii_case(PasswordFormat::Sha1.as_str()) {
            PasswordFormat::Sha1
        } else {
            PasswordFormat::Invalid
        }
    }
}

/// A stored password with its format.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AclPassword {
    /// Password text or hash.
    pub password: String,
    /// Format of the stored password.
    pub format: PasswordFormat,
}

impl AclPassword {
    /// True when the format is recognized.
    pub fn is_valid(&self) -> bool {
        self.format != PasswordFormat::Invalid
    }

    /// Serializes to a value map.
    pub fn to_value(&self) -> Value {
        let mut m = BTreeMap::new();
        m.insert("password".to_string(), Value::from(self.password.clone()));
        m.insert("format".to_string(), Value::from(self.format.as_str()));
        Value::Map(m)
    }

    /// Deserializes from a value map.
    pub fn from_value(v: &Value) -> Self {
        Self {
            password: v.get("password").as_str().to_string(),
            format: PasswordFormat::from_str(v.get("format").as_str()),
        }
    }
}

/// A user: password plus granted roles.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AclUser {
    /// The user's password.
    pub password: AclPassword,
    /// Granted role names.
    pub roles: Vec<String>,
}

impl AclUser {
    /// True when the password is valid.
    pub fn is_valid(&self) -> bool {
        self.password.is_valid()
    }

    /// Serializes to a value map.
    pub fn to_value(&self) -> Value {
        let mut m = BTreeMap::new();
        m.insert("password".to_string(), self.password.to_value());
        m.insert(
            "roles".to_string(),
            Value::List(self.roles.iter().map(|r| Value::from(r.clone())).collect()),
        );
        Value::Map(m)
    }

    /// Deserializes from a value map.
    pub fn from_value(v: &Value) -> Self {
        Self {
            password: AclPassword::from_value(v.get("password")),
            roles: v
                .get("roles")
                .as_list()
                .iter()
                .map(|r| r.as_str().to_string())
                .collect(),
        }
    }
}

/// A mount definition: where a device attaches in the broker tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AclMountDef {
    /// Mount point path.
    pub mount_point: String,
    /// Optional description.
    pub description: String,
}

impl AclMountDef {
    /// Serializes to a value map, omitting an empty description.
    pub fn to_value(&self) -> Value {
        let mut m = BTreeMap::new();
        m.insert(
            "mountPoint".to_string(),
            Value::from(self.mount_point.clone()),
        );
        if !self.description.is_empty() {
            m.insert(
                "description".to_string(),
                Value::from(self.description.clone()),
            );
        }
        Value::Map(m)
    }

    /// Deserializes from either a bare mount-point string or a value map.
    pub fn from_value(v: &Value) -> Self {
        match v {
            Value::String(s) => Self {
                mount_point: s.clone(),
                description: String::new(),
            },
            _ => Self {
                mount_point: v.get("mountPoint").as_str().to_string(),
                description: v.get("description").as_str().to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_format_mixed_case() {
        assert_eq!(PasswordFormat::from_str("PLAIN"), PasswordFormat::Plain);
        assert_eq!(PasswordFormat::from_str("plain"), PasswordFormat::Plain);
        assert_eq!(PasswordFormat::from_str("Plain"), PasswordFormat::Plain);
        assert_eq!(PasswordFormat::from_str("sHa1"), PasswordFormat::Sha1);
        assert_eq!(PasswordFormat::from_str("sha2"), PasswordFormat::Invalid);
        assert_eq!(PasswordFormat::from_str(""), PasswordFormat::Invalid);
    }

    #[test]
    fn test_password_roundtrip() {
        let p = AclPassword {
            password: "secret".to_string(),
            format: PasswordFormat::Sha1,
        };
        assert!(p.is_valid());
        assert_eq!(AclPassword::from_value(&p.to_value()), p);
    }

    #[test]
    fn test_user_roundtrip() {
        let u = AclUser {
            password: AclPassword {
                password: "x".to_string(),
                format: PasswordFormat::Plain,
            },
            roles: vec!["tester".to_string(), "admin".to_string()],
        };
        assert_eq!(AclUser::from_value(&u.to_value()), u);
    }

    #[test]
    fn test_mount_def_from_string_or_map() {
        let m = AclMountDef::from_value(&Value::from("a/b"));
        assert_eq!(m.mount_point, "a/b");

        let m2 = AclMountDef {
            mount_point: "c/d".to_string(),
            description: "test mount".to_string(),
        };
        assert_eq!(AclMountDef::from_value(&m2.to_value()), m2);

        // empty description is omitted on encode
        let m3 = AclMountDef {
            mount_point: "e".to_string(),
            description: String::new(),
        };
        assert!(m3.to_value().get("description").is_null());
    }
}
