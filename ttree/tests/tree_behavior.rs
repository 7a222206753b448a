use std::sync::Arc;

use ttree::{
    InMemoryTreeBackend, LeafPointer, MessageTreeStore, NewMessage, ParentSelector,
    SqliteTreeBackend, StoreErrorKind, StoredMessage, ThreadSettings,
};

fn stores() -> Vec<(&'static str, MessageTreeStore)> {
    vec![
        (
            "memory",
            MessageTreeStore::new(Arc::new(InMemoryTreeBackend::new())),
        ),
        (
            "sqlite",
            MessageTreeStore::new(Arc::new(
                SqliteTreeBackend::new_in_memory().expect("sqlite should open"),
            )),
        ),
    ]
}

fn contents(path: &[StoredMessage]) -> Vec<&str> {
    path.iter().map(|message| message.content.as_str()).collect()
}

struct Fork {
    store: MessageTreeStore,
    thread: ttree::Thread,
    root: StoredMessage,
    first: StoredMessage,
    second: StoredMessage,
    second_child: StoredMessage,
}

/// root ── first
///      └─ second ── second-child
async fn fork(store: MessageTreeStore) -> Fork {
    let thread = store
        .create_thread("Fork", ThreadSettings::default())
        .await
        .expect("thread");
    let root = store
        .append_message(NewMessage::user(thread.id.clone(), "root"))
        .await
        .expect("root");
    let first = store
        .append_message(NewMessage::assistant(thread.id.clone(), "first"))
        .await
        .expect("first");
    let second = store
        .append_message(
            NewMessage::assistant(thread.id.clone(), "second")
                .with_parent(ParentSelector::Message(root.id.clone())),
        )
        .await
        .expect("second");
    let second_child = store
        .append_message(NewMessage::user(thread.id.clone(), "second-child"))
        .await
        .expect("second child");

    Fork {
        store,
        thread,
        root,
        first,
        second,
        second_child,
    }
}

#[tokio::test]
async fn explicit_root_leaf_yields_empty_path() {
    for (name, store) in stores() {
        let fork = fork(store).await;
        let path = fork
            .store
            .get_active_path(&fork.thread.id, Some(LeafPointer::Root))
            .await
            .expect("path");
        assert!(path.is_empty(), "{name}");

        let active = fork
            .store
            .get_active_path(&fork.thread.id, None)
            .await
            .expect("path");
        assert_eq!(contents(&active), vec!["root", "second", "second-child"], "{name}");
    }
}

#[tokio::test]
async fn unset_leaf_falls_back_to_latest_message() {
    for (name, store) in stores() {
        let thread = store
            .create_thread("Latest", ThreadSettings::default())
            .await
            .expect("thread");
        let first = store
            .append_message(NewMessage::user(thread.id.clone(), "a").without_leaf_update())
            .await
            .expect("a");
        store
            .append_message(
                NewMessage::assistant(thread.id.clone(), "b")
                    .with_parent(ParentSelector::Message(first.id.clone()))
                    .without_leaf_update(),
            )
            .await
            .expect("b");

        assert_eq!(
            store.get_thread(&thread.id).await.expect("thread").active_leaf,
            LeafPointer::Latest,
            "{name}"
        );
        let path = store
            .get_active_path(&thread.id, None)
            .await
            .expect("path");
        assert_eq!(contents(&path), vec!["a", "b"], "{name}");
    }
}

#[tokio::test]
async fn branch_info_reports_sibling_position() {
    for (name, store) in stores() {
        let fork = fork(store).await;
        let info = fork
            .store
            .get_branch_info(&fork.second.id)
            .await
            .expect("info");
        assert_eq!((info.current, info.total), (2, 2), "{name}");
        assert_eq!(info.siblings, vec![fork.first.id.clone(), fork.second.id.clone()]);

        let root_info = fork.store.get_branch_info(&fork.root.id).await.expect("info");
        assert_eq!((root_info.current, root_info.total), (1, 1), "{name}");
    }
}

#[tokio::test]
async fn deleting_subtree_removes_descendants_and_moves_leaf() {
    for (name, store) in stores() {
        let fork = fork(store).await;
        let outcome = fork
            .store
            .delete_subtree(&fork.second.id)
            .await
            .expect("delete");

        assert_eq!(outcome.deleted.len(), 2, "{name}");
        assert_eq!(
            outcome.reassigned_leaf,
            Some(LeafPointer::Message(fork.root.id.clone())),
            "{name}"
        );
        for id in [&fork.second.id, &fork.second_child.id] {
            let error = fork.store.get_message(id).await.expect_err("deleted");
            assert_eq!(error.kind, StoreErrorKind::NotFound, "{name}");
        }

        let path = fork
            .store
            .get_active_path(&fork.thread.id, None)
            .await
            .expect("path");
        assert_eq!(contents(&path), vec!["root"], "{name}");
        assert_eq!(
            fork.store.children(&fork.root.id).await.expect("children").len(),
            1,
            "{name}"
        );
    }
}

#[tokio::test]
async fn deleting_off_path_subtree_keeps_leaf_and_root_deletion_clears_it() {
    for (name, store) in stores() {
        let fork = fork(store).await;

        let outcome = fork
            .store
            .delete_subtree(&fork.first.id)
            .await
            .expect("delete");
        assert_eq!(outcome.reassigned_leaf, None, "{name}");
        assert_eq!(
            fork.store
                .get_thread(&fork.thread.id)
                .await
                .expect("thread")
                .active_leaf,
            LeafPointer::Message(fork.second_child.id.clone()),
            "{name}"
        );

        let outcome = fork
            .store
            .delete_subtree(&fork.root.id)
            .await
            .expect("delete root");
        assert_eq!(outcome.reassigned_leaf, Some(LeafPointer::Root), "{name}");
        assert!(
            fork.store
                .get_active_path(&fork.thread.id, None)
                .await
                .expect("path")
                .is_empty()
        );
    }
}

#[tokio::test]
async fn switch_branch_descends_to_newest_leaf_and_is_idempotent() {
    for (name, store) in stores() {
        let fork = fork(store).await;

        let leaf = fork.store.switch_branch(&fork.first.id).await.expect("switch");
        assert_eq!(leaf, fork.first.id, "{name}");
        let again = fork.store.switch_branch(&fork.first.id).await.expect("switch");
        assert_eq!(again, leaf, "{name}");

        let leaf = fork.store.switch_branch(&fork.root.id).await.expect("switch");
        assert_eq!(leaf, fork.second_child.id, "{name}");
        let path = fork
            .store
            .get_active_path(&fork.thread.id, None)
            .await
            .expect("path");
        assert_eq!(contents(&path), vec!["root", "second", "second-child"], "{name}");
    }
}

#[tokio::test]
async fn in_place_edit_keeps_tree_position() {
    for (name, store) in stores() {
        let fork = fork(store).await;
        let attachment = ttree::Attachment::new("cat.png", "image/png", "iVBOR");
        let edited = fork
            .store
            .update_message_content(&fork.second_child.id, "edited", vec![attachment.clone()])
            .await
            .expect("edit");
        assert_eq!(edited.parent_id, fork.second_child.parent_id, "{name}");

        let loaded = fork
            .store
            .get_message(&fork.second_child.id)
            .await
            .expect("load");
        assert_eq!(loaded.content, "edited", "{name}");
        assert_eq!(loaded.attachments, vec![attachment], "{name}");
    }
}

#[tokio::test]
async fn parent_from_another_thread_is_rejected() {
    for (name, store) in stores() {
        let fork = fork(store).await;
        let other = fork
            .store
            .create_thread("Other", ThreadSettings::default())
            .await
            .expect("thread");

        let error = fork
            .store
            .append_message(
                NewMessage::user(other.id.clone(), "stray")
                    .with_parent(ParentSelector::Message(fork.root.id.clone())),
            )
            .await
            .expect_err("cross-thread parent");
        assert_eq!(error.kind, StoreErrorKind::InvalidRequest, "{name}");
    }
}

#[tokio::test]
async fn backup_restores_into_an_empty_store() {
    for (name, store) in stores() {
        let fork = fork(store).await;
        let backup = fork.store.export_backup().await.expect("export");
        assert_eq!(backup.threads.len(), 1, "{name}");
        assert_eq!(backup.messages.len(), 4, "{name}");

        let json = serde_json::to_string(&backup).expect("backup serializes");
        let restored_backup = serde_json::from_str(&json).expect("backup deserializes");

        let target = MessageTreeStore::in_memory();
        target.import_backup(restored_backup).await.expect("import");
        let path = target
            .get_active_path(&fork.thread.id, None)
            .await
            .expect("path");
        assert_eq!(contents(&path), vec!["root", "second", "second-child"], "{name}");
    }
}

#[tokio::test]
async fn invalid_backup_is_rejected_without_writes() {
    for (name, store) in stores() {
        let fork = fork(store).await;
        let mut backup = fork.store.export_backup().await.expect("export");
        backup.messages[1].parent_id = Some(tcommon::MessageId::new("missing"));

        let target = MessageTreeStore::in_memory();
        let error = target.import_backup(backup).await.expect_err("dangling parent");
        assert_eq!(error.kind, StoreErrorKind::InvalidRequest, "{name}");
        assert!(target.list_threads().await.expect("list").is_empty(), "{name}");
    }
}
