use std::{collections::HashMap, fs::File, io::BufReader, path::Path};

use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("failed to read user directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse user directory: {0}")]
    Json(#[from] serde_json::Error),
}

/// One known member of the club, as stored in the users file.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Member {
    pub name: String,
    pub id: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// Map from a person's display name to their user id in the store.
///
/// Lookups ignore case and surrounding whitespace.  A name that is not in the
/// directory can't be resolved, and whatever depends on it gets skipped.
#[derive(Clone, Debug, Default)]
pub struct UserDirectory {
    ids: HashMap<String, String>,
}

impl UserDirectory {
    pub fn new(members: Vec<Member>) -> UserDirectory {
        let mut ids = HashMap::new();
        for member in members {
            for alias in &member.aliases {
                ids.insert(normalize(alias), member.id.clone());
            }
            ids.insert(normalize(&member.name), member.id);
        }
        UserDirectory { ids }
    }

    /// The four members whose picks are in the historical log.
    pub fn founding_members() -> UserDirectory {
        UserDirectory::new(vec![
            member("Fergus Neville", "00000000-0000-0000-0000-000000000001"),
            member("Neil Tilston", "00000000-0000-0000-0000-000000000002"),
            member("Rory Edwards", "00000000-0000-0000-0000-000000000003"),
            member("David Thomas", "00000000-0000-0000-0000-000000000004"),
        ])
    }

    /// Read the directory from a json file with a list of members, e.g.
    /// `[{"name": "Neil Tilston", "id": "...", "aliases": ["neil"]}]`
    pub fn from_path(path: &Path) -> Result<UserDirectory, DirectoryError> {
        let members: Vec<Member> = serde_json::from_reader(BufReader::new(File::open(path)?))?;
        Ok(UserDirectory::new(members))
    }

    pub fn user_id(&self, name: &str) -> Option<&str> {
        self.ids.get(&normalize(name)).map(|id| id.as_str())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

fn member(name: &str, id: &str) -> Member {
    Member {
        name: name.to_string(),
        id: id.to_string(),
        aliases: vec![],
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::*;

    #[test]
    fn founding_members() {
        let directory = UserDirectory::founding_members();
        assert_eq!(directory.len(), 4);
        assert_eq!(
            directory.user_id("Neil Tilston"),
            Some("00000000-0000-0000-0000-000000000002")
        );
        assert_eq!(
            directory.user_id(" fergus neville "),
            Some("00000000-0000-0000-0000-000000000001")
        );
        assert_eq!(directory.user_id("Someone Else"), None);
    }

    #[test]
    fn from_path_errors() {
        let res = UserDirectory::from_path(Path::new("/nonexistent/users.json"));
        assert!(matches!(res, Err(DirectoryError::Io(_))));
        let empty = UserDirectory::new(vec![]);
        assert!(empty.is_empty());
        assert!(!UserDirectory::founding_members().is_empty());
    }

    #[test]
    fn members_with_aliases() -> Result<(), Box<dyn Error>> {
        let members: Vec<Member> = serde_json::from_str(
            r#"[
                {"name": "Rory Edwards", "id": "r-1", "aliases": ["Rory"]},
                {"name": "Dave", "id": "d-1"}
            ]"#,
        )?;
        let directory = UserDirectory::new(members);
        assert_eq!(directory.user_id("rory"), Some("r-1"));
        assert_eq!(directory.user_id("Rory Edwards"), Some("r-1"));
        assert_eq!(directory.user_id("DAVE"), Some("d-1"));
        assert_eq!(directory.user_id("Ferg"), None);
        Ok(())
    }
}
