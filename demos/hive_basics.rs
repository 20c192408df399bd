//! Demonstration of basic Hive usage: subscriptions, equality, persistence

use std::sync::Arc;

use apiary::{Hive, MemoryStorage, StorageBackend};
use serde_json::json;

fn main() {
    // A plain cell.
    let counter = Hive::new(0);

    let sub = counter.subscribe(|n: &i32| {
        println!("counter changed: {n}");
    });

    counter.set(1);
    counter.set(2);
    counter.set(2); // equal value, no notification

    sub.unsubscribe();
    counter.set(3); // nobody listening

    // A weak subscription dies with its owner.
    let owner = Arc::new(());
    counter
        .subscribe_weak(
            |n: &i32| {
                println!("weakly observed: {n}");
            },
            &owner,
        )
        .detach();

    counter.set(4);
    drop(owner);
    counter.set(5); // the dead subscriber is purged here

    // A storage-backed cell hydrates from its last persisted value.
    let storage: Arc<dyn StorageBackend> = Arc::new(MemoryStorage::new());
    storage.set("theme", &json!("dark"));

    let theme: Hive<String> = Hive::with_storage("light".to_string(), "theme", storage.clone());
    println!("hydrated theme: {}", theme.get());

    theme.set("sepia".to_string());
    println!("persisted: {:?}", storage.get("theme"));
}
