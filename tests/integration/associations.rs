//! Associations resolved across two stores

use crate::common::*;
use annal::{AssociationDescriptor, AssociationRegistry};

fn registry() -> AssociationRegistry {
    AssociationRegistry::new()
        .with(AssociationDescriptor::belongs_to::<Post, Account>(
            "author",
            "author_id",
        ))
        .unwrap()
}

fn post(title: &str, author: Option<EntityId>) -> Post {
    Post {
        title: title.to_string(),
        author_id: author,
    }
}

#[test]
fn preload_pairs_posts_with_current_authors() {
    let accounts = VersionStore::<Account>::in_memory();
    let posts = VersionStore::<Post>::in_memory();

    let ann = accounts.create(account("ann")).unwrap();
    accounts.extend(&ann, Changes::new().set("name", "Ann")).unwrap();
    let bob = accounts.create(account("bob")).unwrap();
    accounts.tombstone(&bob).unwrap();

    posts.create(post("one", Some(ann.entity_id()))).unwrap();
    posts.create(post("two", Some(bob.entity_id()))).unwrap();
    posts.create(post("three", None)).unwrap();

    let sources = posts
        .resolver()
        .current()
        .order_by(|r| r.fields().title.clone())
        .fetch()
        .unwrap();
    let loaded = registry()
        .preload("author", &sources, &accounts.resolver())
        .unwrap();

    let pairs: Vec<(String, Option<String>)> = loaded
        .iter()
        .map(|p| {
            (
                p.source.fields().title.clone(),
                p.target.as_ref().map(|t| t.fields().name.clone()),
            )
        })
        .collect();
    assert_eq!(
        pairs,
        vec![
            ("one".to_string(), Some("Ann".to_string())),
            ("three".to_string(), None),
            ("two".to_string(), None),
        ]
    );
    // Target is the latest version, not the one the post was written against
    assert_eq!(loaded[0].target.as_ref().unwrap().version().as_u64(), 2);
}

#[test]
fn global_registry_installs_once() {
    let installed = registry().install_global().unwrap();
    assert!(installed.get("author").is_some());
    assert!(AssociationRegistry::global().is_some());

    let err = AssociationRegistry::new().install_global().unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    assert_eq!(AssociationRegistry::global().unwrap().len(), 1);
}
