//! Collaboration scenarios across several users of one dictionary.

mod common;

use lexicon_client::shared::ServiceError;
use lexicon_client::remote::MemoryBackend;
use lexicon_core::{PermissionError, Role, WordDraft};
use pretty_assertions::assert_eq;

use common::{settle, snapshot_where, Participant, ANA, BEN, VERA};

#[tokio::test]
async fn concurrent_difficulty_writes_keep_both_keys() {
    let backend = MemoryBackend::new();
    let ana = Participant::join(&backend, ANA);
    let ben = Participant::join(&backend, BEN);

    let dictionary = ana.shared.create_dictionary("Japanese").await.unwrap();
    ana.shared
        .add_collaborator(dictionary.id, BEN, Role::Editor)
        .await
        .unwrap();
    let word = ana
        .shared
        .add_word(dictionary.id, &WordDraft::new("neko", "cat"))
        .await
        .unwrap();

    let (a, b) = tokio::join!(
        ana.sync.submit_shared_difficulty(&word, 5),
        ben.sync.submit_shared_difficulty(&word, -2),
    );
    assert_eq!(a.unwrap(), 5);
    assert_eq!(b.unwrap(), -2);

    let stored = backend.dictionary_state(dictionary.id).unwrap().words[0].clone();
    assert_eq!(stored.difficulty_for(ANA), 5);
    assert_eq!(stored.difficulty_for(BEN), -2);
    assert_eq!(stored.difficulties.len(), 2);
}

#[tokio::test]
async fn missing_difficulty_reads_as_zero() {
    let backend = MemoryBackend::new();
    let ana = Participant::join(&backend, ANA);
    let dictionary = ana.shared.create_dictionary("Japanese").await.unwrap();
    let word = ana
        .shared
        .add_word(dictionary.id, &WordDraft::new("inu", "dog"))
        .await
        .unwrap();

    assert_eq!(ana.shared.get_difficulty_for(&word, BEN), 0);
    assert!(word.difficulties.is_empty());
}

#[tokio::test]
async fn paused_changes_are_coalesced_until_resume() {
    let backend = MemoryBackend::new();
    let ana = Participant::join(&backend, ANA);
    let dictionary = ana.shared.create_dictionary("Japanese").await.unwrap();
    let mut snapshots = ana.shared.subscribe(dictionary.id).await.unwrap();
    let initial = snapshot_where(&mut snapshots, |_| true).await;

    ana.shared.pause_all();
    ana.shared.pause_all();
    for (text, meaning) in [("yama", "mountain"), ("kawa", "river"), ("umi", "sea")] {
        ana.shared
            .add_word(dictionary.id, &WordDraft::new(text, meaning))
            .await
            .unwrap();
    }
    settle().await;
    assert!(!snapshots.has_changed().unwrap());

    ana.shared.resume_all().await.unwrap();
    let resumed = snapshot_where(&mut snapshots, |snapshot| snapshot.words.len() == 3).await;
    assert_eq!(resumed.revision, initial.revision + 1);

    ana.shared
        .add_word(dictionary.id, &WordDraft::new("sora", "sky"))
        .await
        .unwrap();
    let live = snapshot_where(&mut snapshots, |snapshot| snapshot.words.len() == 4).await;
    assert!(live.revision > resumed.revision);
}

#[tokio::test]
async fn resume_reopens_dropped_subscriptions() {
    let backend = MemoryBackend::new();
    let ana = Participant::join(&backend, ANA);
    let dictionary = ana.shared.create_dictionary("Japanese").await.unwrap();
    let mut snapshots = ana.shared.subscribe(dictionary.id).await.unwrap();
    snapshot_where(&mut snapshots, |_| true).await;

    backend.disconnect_watchers(dictionary.id);
    settle().await;
    assert_eq!(backend.watcher_count(dictionary.id), 0);

    ana.shared.resume_all().await.unwrap();
    assert_eq!(backend.watcher_count(dictionary.id), 1);

    ana.shared
        .add_word(dictionary.id, &WordDraft::new("hana", "flower"))
        .await
        .unwrap();
    snapshot_where(&mut snapshots, |snapshot| snapshot.words.len() == 1).await;
}

#[tokio::test]
async fn own_difficulty_survives_deliveries_until_echoed() {
    let backend = MemoryBackend::new();
    let ana = Participant::join(&backend, ANA);
    let ben = Participant::join(&backend, BEN);
    let dictionary = ana.shared.create_dictionary("Japanese").await.unwrap();
    ana.shared
        .add_collaborator(dictionary.id, BEN, Role::Editor)
        .await
        .unwrap();
    let word = ana
        .shared
        .add_word(dictionary.id, &WordDraft::new("tori", "bird"))
        .await
        .unwrap();
    let mut snapshots = ana.shared.subscribe(dictionary.id).await.unwrap();
    snapshot_where(&mut snapshots, |snapshot| snapshot.words.len() == 1).await;

    backend.set_offline(true);
    assert!(ana.sync.submit_shared_difficulty(&word, 5).await.is_err());
    snapshot_where(&mut snapshots, |snapshot| snapshot.words[0].difficulty_for(ANA) == 5).await;
    backend.set_offline(false);

    assert!(ben.shared.toggle_like(dictionary.id, word.id).await.unwrap());
    let liked = snapshot_where(&mut snapshots, |snapshot| snapshot.words[0].is_liked_by(BEN)).await;
    assert_eq!(liked.words[0].difficulty_for(ANA), 5);
    assert!(!backend.dictionary_state(dictionary.id).unwrap().words[0].has_attempts_by(ANA));

    assert_eq!(ana.sync.retry_failed().await.unwrap(), 1);
    assert_eq!(
        backend.dictionary_state(dictionary.id).unwrap().words[0].difficulty_for(ANA),
        5
    );
}

#[tokio::test]
async fn editor_cannot_remove_other_collaborators() {
    let backend = MemoryBackend::new();
    let ana = Participant::join(&backend, ANA);
    let ben = Participant::join(&backend, BEN);
    let dictionary = ana.shared.create_dictionary("Japanese").await.unwrap();
    ana.shared
        .add_collaborator(dictionary.id, BEN, Role::Editor)
        .await
        .unwrap();
    ana.shared
        .add_collaborator(dictionary.id, VERA, Role::Viewer)
        .await
        .unwrap();

    let err = ben
        .shared
        .remove_collaborator(dictionary.id, VERA)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Permission(_)));
    let state = backend.dictionary_state(dictionary.id).unwrap();
    assert_eq!(state.dictionary.role_of(VERA), Some(Role::Viewer));
}

#[tokio::test]
async fn viewer_can_leave_but_not_edit() {
    let backend = MemoryBackend::new();
    let ana = Participant::join(&backend, ANA);
    let vera = Participant::join(&backend, VERA);
    let dictionary = ana.shared.create_dictionary("Japanese").await.unwrap();
    ana.shared
        .add_collaborator(dictionary.id, VERA, Role::Viewer)
        .await
        .unwrap();

    let err = vera
        .shared
        .add_word(dictionary.id, &WordDraft::new("ki", "tree"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Permission(PermissionError::InsufficientRole { .. })
    ));

    vera.shared.remove_collaborator(dictionary.id, VERA).await.unwrap();
    let state = backend.dictionary_state(dictionary.id).unwrap();
    assert_eq!(state.dictionary.role_of(VERA), None);
    assert_eq!(state.dictionary.owner_email(), Some(ANA));
}

#[tokio::test]
async fn owner_cannot_be_demoted_or_removed() {
    let backend = MemoryBackend::new();
    let ana = Participant::join(&backend, ANA);
    let ben = Participant::join(&backend, BEN);
    let dictionary = ana.shared.create_dictionary("Japanese").await.unwrap();
    ana.shared
        .add_collaborator(dictionary.id, BEN, Role::Editor)
        .await
        .unwrap();

    assert!(ben
        .shared
        .update_collaborator_role(dictionary.id, ANA, Role::Viewer)
        .await
        .is_err());
    assert!(ana.shared.remove_collaborator(dictionary.id, ANA).await.is_err());
    assert!(ana
        .shared
        .update_collaborator_role(dictionary.id, BEN, Role::Owner)
        .await
        .is_err());

    let state = backend.dictionary_state(dictionary.id).unwrap();
    assert_eq!(state.dictionary.owner_email(), Some(ANA));
    assert_eq!(state.dictionary.role_of(BEN), Some(Role::Editor));
}
