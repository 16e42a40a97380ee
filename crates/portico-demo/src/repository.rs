//! Member and item storage.

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::DemoError;

/// A registered account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    /// Account name.
    pub username: String,
    /// Password.
    pub password: String,
}

/// An item owned by a member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    /// Item id.
    pub id: i64,
    /// Owner's username.
    pub owner: String,
    /// Display name.
    pub name: String,
    /// Category.
    pub category: String,
}

/// Storage behind the example service.
#[async_trait]
pub trait ExampleRepository: Send + Sync + 'static {
    /// Looks up a member by username.
    async fn find_member(&self, username: &str) -> Result<Option<Member>, DemoError>;

    /// Items owned by `username` whose name contains `item`, ignoring case.
    async fn list_items(&self, username: &str, item: &str) -> Result<Vec<Item>, DemoError>;
}

/// Repository held in memory.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    members: RwLock<Vec<Member>>,
    items: RwLock<Vec<Item>>,
}

impl InMemoryRepository {
    /// An empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// A repository with two members and a handful of items.
    pub fn seeded() -> Self {
        let repo = Self::new();
        repo.add_member("ann", "secret");
        repo.add_member("bob", "hunter2");
        repo.add_item("ann", "Fountain Pen", "stationery");
        repo.add_item("ann", "Notebook", "stationery");
        repo.add_item("ann", "Pencil case", "stationery");
        repo.add_item("bob", "Pen drive", "electronics");
        repo
    }

    /// Adds or replaces a member.
    pub fn add_member(&self, username: impl Into<String>, password: impl Into<String>) {
        let member = Member {
            username: username.into(),
            password: password.into(),
        };
        let mut members = self.members.write();
        members.retain(|existing| existing.username != member.username);
        members.push(member);
    }

    /// Adds an item and returns its id.
    pub fn add_item(
        &self,
        owner: impl Into<String>,
        name: impl Into<String>,
        category: impl Into<String>,
    ) -> i64 {
        let mut items = self.items.write();
        let id = items.iter().map(|item| item.id).max().unwrap_or(0) + 1;
        items.push(Item {
            id,
            owner: owner.into(),
            name: name.into(),
            category: category.into(),
        });
        id
    }
}

#[async_trait]
impl ExampleRepository for InMemoryRepository {
    async fn find_member(&self, username: &str) -> Result<Option<Member>, DemoError> {
        Ok(self
            .members
            .read()
            .iter()
            .find(|member| member.username == username)
            .cloned())
    }

    async fn list_items(&self, username: &str, item: &str) -> Result<Vec<Item>, DemoError> {
        let needle = item.to_lowercase();
        Ok(self
            .items
            .read()
            .iter()
            .filter(|row| row.owner == username && row.name.to_lowercase().contains(&needle))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_find_member() {
        let repo = InMemoryRepository::seeded();
        let ann = repo.find_member("ann").await.unwrap().unwrap();
        assert_eq!(ann.password, "secret");
        assert!(repo.find_member("carol").await.unwrap().is_none());

        repo.add_member("ann", "changed");
        let ann = repo.find_member("ann").await.unwrap().unwrap();
        assert_eq!(ann.password, "changed");
    }

    #[tokio::test]
    async fn test_list_items_filters_owner_and_name() {
        let repo = InMemoryRepository::seeded();

        let pens = repo.list_items("ann", "PEN").await.unwrap();
        let names: Vec<_> = pens.iter().map(|item| item.name.as_str()).collect();
        assert_eq!(names, ["Fountain Pen", "Pencil case"]);

        let bobs = repo.list_items("bob", "pen").await.unwrap();
        assert_eq!(bobs.len(), 1);
        assert_eq!(bobs[0].category, "electronics");

        assert!(repo.list_items("carol", "pen").await.unwrap().is_empty());
    }

    #[test]
    fn test_item_ids_increase() {
        let repo = InMemoryRepository::new();
        assert_eq!(repo.add_item("ann", "a", "x"), 1);
        assert_eq!(repo.add_item("ann", "b", "x"), 2);
    }
}
