//! # Category Seeding
//!
//! Categories have no HTTP write path, they are managed here against the same Redis the
//! server reads from.
//!
//! - `add-category <name>`: blank names are refused
//! - `remove-category <id>`: APKs in the category keep existing, their `categoryId` is cleared
//! - `list-categories`: id and name per line

use anyhow::{Result, bail};
use catalog::CategoryId;
use server::{database::RedisStore, store::CatalogStore};
use tracing::info;

#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Add(String),
    Remove(CategoryId),
    List,
}

pub async fn run(redis_url: &str, command: Command) -> Result<()> {
    let store = RedisStore::connect(redis_url).await?;

    for line in execute(&store, command).await? {
        println!("{line}");
    }

    Ok(())
}

/// Runs `command` and returns what should be printed.
pub async fn execute(store: &dyn CatalogStore, command: Command) -> Result<Vec<String>> {
    match command {
        Command::Add(name) => {
            let name = name.trim();
            if name.is_empty() {
                bail!("Category name must not be blank");
            }

            let category = store.create_category(name).await?;
            info!("Added category {} ({})", category.id, category.name);

            Ok(vec![category.id.to_string()])
        }
        Command::Remove(id) => match store.delete_category(id).await? {
            Some(detached) => {
                info!("Removed category {id}, detached {detached} apks");

                Ok(vec![format!(
                    "Removed category {id}, {detached} apks uncategorized"
                )])
            }
            None => bail!("Category {id} not found"),
        },
        Command::List => Ok(store
            .list_categories()
            .await?
            .into_iter()
            .map(|category| format!("{}\t{}", category.id, category.name))
            .collect()),
    }
}

#[cfg(test)]
mod tests {
    use catalog::NewApk;
    use chrono::Utc;
    use server::memory::MemoryStore;

    use super::*;

    #[tokio::test]
    async fn test_add_and_list() {
        let store = MemoryStore::new();

        assert_eq!(
            execute(&store, Command::Add("  Games ".into())).await.unwrap(),
            vec!["1"]
        );
        execute(&store, Command::Add("Tools".into())).await.unwrap();

        assert_eq!(
            execute(&store, Command::List).await.unwrap(),
            vec!["1\tGames", "2\tTools"]
        );
    }

    #[tokio::test]
    async fn test_blank_name_refused() {
        let store = MemoryStore::new();

        assert!(execute(&store, Command::Add("   ".into())).await.is_err());
        assert!(store.list_categories().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_uncategorizes() {
        let store = MemoryStore::new();
        execute(&store, Command::Add("Games".into())).await.unwrap();

        let apk = store
            .create_apk(
                NewApk {
                    name: "Chess".into(),
                    version: "2.0".into(),
                    description: None,
                    category_id: Some(1),
                    file_url: "https://x/chess.apk".into(),
                    file_key: "chess".into(),
                    photo_url: None,
                    photo_key: None,
                    file_size: None,
                },
                Utc::now(),
            )
            .await
            .unwrap();

        assert_eq!(
            execute(&store, Command::Remove(1)).await.unwrap(),
            vec!["Removed category 1, 1 apks uncategorized"]
        );
        assert_eq!(store.get_apk(apk.id).await.unwrap().unwrap().category_id, None);
        assert!(execute(&store, Command::Remove(1)).await.is_err());
    }
}
