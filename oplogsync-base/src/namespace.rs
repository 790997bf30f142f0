// A namespace is "database.collection". Command entries only carry the
// database prefix (the collection half of the split is unused for `c`).

use crate::error::{err, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    pub database: String,
    pub collection: String,
}

impl Namespace {
    /// Parse a full `database.collection` namespace. Used for `i`/`u`/`d`
    /// entries, where both halves matter.
    pub fn parse(ns: &str) -> Result<Namespace> {
        match ns.split_once('.') {
            Some((db, coll)) if !db.is_empty() && !coll.is_empty() => Ok(Namespace {
                database: db.to_string(),
                collection: coll.to_string(),
            }),
            _ => Err(err(format!("invalid namespace: {ns:?}"))),
        }
    }

    /// Parse just the database prefix of a namespace, as used by `c` entries.
    pub fn database_of(ns: &str) -> Result<String> {
        match ns.split_once('.') {
            Some((db, _)) if !db.is_empty() => Ok(db.to_string()),
            _ => Err(err(format!("invalid namespace: {ns:?}"))),
        }
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn splits_database_and_collection() {
        let ns = Namespace::parse("mydb.mycoll").unwrap();
        assert_eq!(ns.database, "mydb");
        assert_eq!(ns.collection, "mycoll");
    }

    #[test]
    fn collection_name_may_contain_dots() {
        let ns = Namespace::parse("mydb.system.indexes").unwrap();
        assert_eq!(ns.database, "mydb");
        assert_eq!(ns.collection, "system.indexes");
    }

    #[test]
    fn rejects_missing_dot() {
        assert!(Namespace::parse("nodothere").is_err());
    }

    #[test]
    fn database_of_command_namespace() {
        assert_eq!(Namespace::database_of("mydb.$cmd").unwrap(), "mydb");
    }
}
