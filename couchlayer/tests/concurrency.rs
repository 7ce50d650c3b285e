mod common;

use common::{User, named_user};
use couchlayer::{memory::InMemoryStore, prelude::*};

#[tokio::test]
async fn one_of_two_concurrent_writers_wins() {
    let repository = Repository::new(InMemoryStore::new());
    let mut alice = named_user("alice", 31);
    repository
        .create(&mut alice, &PassThrough)
        .await
        .unwrap();

    let mut first = alice.clone();
    first.age = 40;
    let mut second = alice.clone();
    second.age = 50;

    let first_mapper = serde_mapper::<User>();
    let second_mapper = serde_mapper::<User>();
    let (a, b) = futures::join!(
        repository.quick_save(&mut first, &first_mapper),
        repository.quick_save(&mut second, &second_mapper),
    );

    let (winner, err) = match (a, b) {
        (Ok(winner), Err(err)) | (Err(err), Ok(winner)) => (winner, err),
        (a, b) => panic!("expected exactly one success, got {a:?} and {b:?}"),
    };
    assert_eq!(err.kind(), ErrorKind::SaveFailed);
    assert!(err.cause().unwrap().is_conflict());

    let stored = repository
        .get(alice.id(), &serde_mapper::<User>())
        .await
        .unwrap();
    assert_eq!(stored.age, winner.age);
    assert!(stored.revision().starts_with("2-"));
}

#[tokio::test]
async fn concurrent_tasks_at_the_same_revision_succeed_once() {
    let repository = Repository::new(InMemoryStore::new());
    let mut alice = named_user("alice", 31);
    repository
        .create(&mut alice, &PassThrough)
        .await
        .unwrap();

    let handles = (0..8)
        .map(|age| {
            let repository = repository.clone();
            let mut copy = alice.clone();
            copy.age = age;
            tokio::spawn(async move { repository.quick_save(&mut copy, &PassThrough).await })
        })
        .collect::<Vec<_>>();

    let results = futures::future::join_all(handles).await;
    let succeeded = results
        .into_iter()
        .map(|joined| joined.unwrap())
        .filter(Result::is_ok)
        .count();
    assert_eq!(succeeded, 1);

    let info = repository.info().await.unwrap();
    assert_eq!(info.doc_count, 1);
}

#[tokio::test]
async fn sequential_saves_advance_revision_and_timestamp() {
    let repository = Repository::new(InMemoryStore::new());
    let mut alice = named_user("alice", 31);
    repository
        .create(&mut alice, &PassThrough)
        .await
        .unwrap();

    let mut previous = alice.last_modified();
    for generation in 2..=5 {
        alice.age += 1;
        repository
            .save(&mut alice, true, &PassThrough)
            .await
            .unwrap();

        assert!(alice.revision().starts_with(&format!("{generation}-")));
        assert!(alice.last_modified() > previous);
        previous = alice.last_modified();
    }
}
