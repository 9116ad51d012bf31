mod common;

use std::sync::Arc;

use event_transformer::db::DbValue;
use event_transformer::transformations::{
    InsertionModel, ModelError, NaturalKey, PersistError, PersistMode, Repository, ILK, URN,
};

use common::{fresh_key, random_block, setup};

const TRANSFORMER: &str = "vat_fold";

fn vat_init(schema: &str, header_id: i64, log_index: i32, ilk: &str) -> InsertionModel {
    InsertionModel::builder(schema, "vat_init")
        .column("header_id", header_id)
        .column("log_index", log_index)
        .foreign_key("ilk_id", ILK, ilk)
        .conflict_on(["header_id", "log_index"])
        .build()
        .unwrap()
}

fn vat_fold(schema: &str, header_id: i64, ilk: &str, urn: &str, rate: &str) -> InsertionModel {
    InsertionModel::builder(schema, "vat_fold")
        .column("header_id", header_id)
        .column("log_index", 0i32)
        .foreign_key("ilk_id", ILK, ilk)
        .foreign_key("urn_id", URN, (ilk, urn))
        .column("rate", DbValue::Numeric(rate.to_string()))
        .conflict_on(["header_id", "log_index"])
        .build()
        .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_persists_create_one_mapping_row() {
    let Some(t) = setup().await else { return };
    let repository = Arc::new(Repository::new(t.db.clone()));

    for _ in 0..5 {
        let ilk = fresh_key("ETH-A");
        let block = random_block();

        let mut tasks = Vec::new();
        for i in 0..4 {
            let header = t.header(block + i).await;
            let repository = repository.clone();
            let model = vat_init(&t.schema, header.id, 0, &ilk);
            tasks.push(tokio::spawn(async move {
                repository
                    .persist(header.id, TRANSFORMER, vec![model], PersistMode::Normal)
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(
            t.count("SELECT COUNT(*) FROM ilks WHERE identifier = $1", &[&ilk])
                .await,
            1
        );
        assert_eq!(
            t.count(
                &format!(
                    "SELECT COUNT(DISTINCT v.ilk_id) FROM {}.vat_init v
                     JOIN ilks i ON i.id = v.ilk_id WHERE i.identifier = $1",
                    t.schema
                ),
                &[&ilk]
            )
            .await,
            1
        );
        assert_eq!(
            t.count(
                &format!(
                    "SELECT COUNT(*) FROM {}.vat_init v
                     JOIN ilks i ON i.id = v.ilk_id WHERE i.identifier = $1",
                    t.schema
                ),
                &[&ilk]
            )
            .await,
            4
        );
    }

    t.teardown().await;
}

#[tokio::test]
async fn test_failed_model_rolls_back_whole_batch() {
    let Some(t) = setup().await else { return };
    let repository = Repository::new(t.db.clone());
    let header = t.header(random_block()).await;
    let ilk = fresh_key("ETH-B");

    let models = vec![
        vat_init(&t.schema, header.id, 0, &ilk),
        InsertionModel::builder(&t.schema, "no_such_table")
            .column("header_id", header.id)
            .build()
            .unwrap(),
    ];

    let err = repository
        .persist(header.id, TRANSFORMER, models, PersistMode::Normal)
        .await
        .unwrap_err();

    assert_eq!(err.phase(), "insert");
    assert!(matches!(
        err,
        PersistError::Insert { ref table, .. } if table.ends_with(".no_such_table")
    ));

    assert_eq!(
        t.count(
            &format!("SELECT COUNT(*) FROM {}.vat_init WHERE header_id = $1", t.schema),
            &[&header.id]
        )
        .await,
        0
    );
    assert_eq!(
        t.count("SELECT COUNT(*) FROM ilks WHERE identifier = $1", &[&ilk])
            .await,
        0
    );
    assert_eq!(repository.checked_count(header.id, TRANSFORMER).await.unwrap(), 0);

    t.teardown().await;
}

#[tokio::test]
async fn test_recheck_increments_count_and_overwrites() {
    let Some(t) = setup().await else { return };
    let repository = Repository::new(t.db.clone());
    let header = t.header(random_block()).await;
    let ilk = fresh_key("ETH-C");

    repository
        .persist(
            header.id,
            TRANSFORMER,
            vec![vat_fold(&t.schema, header.id, &ilk, "0xabc", "1.5")],
            PersistMode::Normal,
        )
        .await
        .unwrap();
    assert_eq!(repository.checked_count(header.id, TRANSFORMER).await.unwrap(), 1);

    repository
        .persist(
            header.id,
            TRANSFORMER,
            vec![vat_fold(&t.schema, header.id, &ilk, "0xabc", "2.25")],
            PersistMode::Recheck,
        )
        .await
        .unwrap();
    assert_eq!(repository.checked_count(header.id, TRANSFORMER).await.unwrap(), 2);

    let rows = t
        .db
        .query(
            &format!("SELECT rate::text FROM {}.vat_fold WHERE header_id = $1", t.schema),
            &[&header.id],
        )
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get::<_, String>(0), "2.25");

    t.teardown().await;
}

#[tokio::test]
async fn test_normal_mode_leaves_existing_rows_untouched() {
    let Some(t) = setup().await else { return };
    let repository = Repository::new(t.db.clone());
    let header = t.header(random_block()).await;
    let ilk = fresh_key("ETH-D");

    for rate in ["1", "9"] {
        repository
            .persist(
                header.id,
                TRANSFORMER,
                vec![vat_fold(&t.schema, header.id, &ilk, "0xdef", rate)],
                PersistMode::Normal,
            )
            .await
            .unwrap();
    }

    let rows = t
        .db
        .query(
            &format!("SELECT rate::text FROM {}.vat_fold WHERE header_id = $1", t.schema),
            &[&header.id],
        )
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get::<_, String>(0), "1");
    assert_eq!(repository.checked_count(header.id, TRANSFORMER).await.unwrap(), 2);

    t.teardown().await;
}

#[tokio::test]
async fn test_persisted_row_round_trips() {
    let Some(t) = setup().await else { return };
    let repository = Repository::new(t.db.clone());
    let header = t.header(random_block()).await;
    let ilk = fresh_key("ETH-E");

    repository
        .persist(
            header.id,
            TRANSFORMER,
            vec![vat_fold(&t.schema, header.id, &ilk, "0x0123", "-42.000001")],
            PersistMode::Normal,
        )
        .await
        .unwrap();

    let rows = t
        .db
        .query(
            &format!(
                "SELECT v.header_id, v.log_index, i.identifier, u.ilk_identifier, u.identifier, v.rate::text
                 FROM {}.vat_fold v
                 JOIN ilks i ON i.id = v.ilk_id
                 JOIN urns u ON u.id = v.urn_id
                 WHERE v.header_id = $1",
                t.schema
            ),
            &[&header.id],
        )
        .await
        .unwrap();

    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.get::<_, i64>(0), header.id);
    assert_eq!(row.get::<_, i32>(1), 0);
    assert_eq!(row.get::<_, String>(2), ilk);
    assert_eq!(row.get::<_, String>(3), ilk);
    assert_eq!(row.get::<_, String>(4), "0x0123");
    assert_eq!(row.get::<_, String>(5), "-42.000001");

    t.teardown().await;
}

#[tokio::test]
async fn test_resolved_ids_are_stable_across_transactions() {
    let Some(t) = setup().await else { return };
    let repository = Repository::new(t.db.clone());
    let ilk = fresh_key("ETH-F");
    let block = random_block();

    for i in 0..3 {
        let header = t.header(block + i).await;
        repository
            .persist(
                header.id,
                TRANSFORMER,
                vec![
                    vat_init(&t.schema, header.id, 0, &ilk),
                    vat_init(&t.schema, header.id, 1, &ilk),
                ],
                PersistMode::Normal,
            )
            .await
            .unwrap();
    }

    let ids = t
        .db
        .query(
            &format!(
                "SELECT DISTINCT v.ilk_id FROM {}.vat_init v
                 JOIN ilks i ON i.id = v.ilk_id WHERE i.identifier = $1",
                t.schema
            ),
            &[&ilk],
        )
        .await
        .unwrap();
    assert_eq!(ids.len(), 1);
    assert_eq!(
        t.count(
            &format!(
                "SELECT COUNT(*) FROM {}.vat_init v
                 JOIN ilks i ON i.id = v.ilk_id WHERE i.identifier = $1",
                t.schema
            ),
            &[&ilk]
        )
        .await,
        6
    );

    t.teardown().await;
}

#[tokio::test]
async fn test_empty_batch_still_marks_header_checked() {
    let Some(t) = setup().await else { return };
    let repository = Repository::new(t.db.clone());
    let header = t.header(random_block()).await;

    assert_eq!(repository.checked_count(header.id, TRANSFORMER).await.unwrap(), 0);
    repository
        .persist(header.id, TRANSFORMER, vec![], PersistMode::Normal)
        .await
        .unwrap();
    assert_eq!(repository.checked_count(header.id, TRANSFORMER).await.unwrap(), 1);
    assert_eq!(repository.checked_count(header.id, "cat_bite").await.unwrap(), 0);

    t.teardown().await;
}

#[tokio::test]
async fn test_bad_natural_key_rejected_before_any_write() {
    let Some(t) = setup().await else { return };
    let repository = Repository::new(t.db.clone());
    let header = t.header(random_block()).await;
    let ilk = fresh_key("ETH-G");

    let mut model = vat_fold(&t.schema, header.id, &ilk, "0xabc", "1");
    model.foreign_key_values.get_mut("urn_id").unwrap().key = NaturalKey::single("0xabc");

    let err = repository
        .persist(header.id, TRANSFORMER, vec![model], PersistMode::Normal)
        .await
        .unwrap_err();

    assert_eq!(err.phase(), "insert");
    match err {
        PersistError::InvalidModel { source, .. } => {
            assert_eq!(
                source,
                ModelError::NaturalKeyArity {
                    table: format!("{}.vat_fold", t.schema),
                    column: "urn_id".to_string(),
                    expected: 2,
                    actual: 1,
                }
            );
        }
        other => panic!("expected invalid model, got {:?}", other),
    }
    assert_eq!(
        t.count("SELECT COUNT(*) FROM ilks WHERE identifier = $1", &[&ilk])
            .await,
        0
    );
    assert_eq!(repository.checked_count(header.id, TRANSFORMER).await.unwrap(), 0);

    t.teardown().await;
}

#[tokio::test]
async fn test_repeated_conflict_key_in_batch_is_rejected() {
    let Some(t) = setup().await else { return };
    let repository = Repository::new(t.db.clone());
    let header = t.header(random_block()).await;
    let first = fresh_key("ETH-A");
    let second = fresh_key("ETH-B");

    let models = vec![
        vat_init(&t.schema, header.id, 0, &first),
        vat_init(&t.schema, header.id, 0, &second),
    ];

    let err = repository
        .persist(header.id, TRANSFORMER, models, PersistMode::Normal)
        .await
        .unwrap_err();

    assert_eq!(err.phase(), "insert");
    assert!(matches!(
        err,
        PersistError::InvalidModel {
            source: ModelError::DuplicateConflictKey { first: 0, second: 1, .. },
            ..
        }
    ));

    assert_eq!(
        t.count(
            &format!("SELECT COUNT(*) FROM {}.vat_init WHERE header_id = $1", t.schema),
            &[&header.id]
        )
        .await,
        0
    );
    for ilk in [&first, &second] {
        assert_eq!(
            t.count("SELECT COUNT(*) FROM ilks WHERE identifier = $1", &[ilk])
                .await,
            0
        );
    }
    assert_eq!(repository.checked_count(header.id, TRANSFORMER).await.unwrap(), 0);

    t.teardown().await;
}

#[tokio::test]
async fn test_constraint_violation_rolls_back_whole_batch() {
    let Some(t) = setup().await else { return };
    let repository = Repository::new(t.db.clone());
    let header = t.header(random_block()).await;
    let ilk = fresh_key("ETH-H");

    let models = vec![
        vat_init(&t.schema, header.id, 0, &ilk),
        InsertionModel::builder(&t.schema, "notes")
            .column("header_id", header.id)
            .column("body", DbValue::Null)
            .build()
            .unwrap(),
    ];

    let err = repository
        .persist(header.id, TRANSFORMER, models, PersistMode::Normal)
        .await
        .unwrap_err();

    assert_eq!(err.phase(), "insert");
    assert!(matches!(
        err,
        PersistError::Insert { ref table, .. } if table.ends_with(".notes")
    ));

    assert_eq!(
        t.count(
            &format!("SELECT COUNT(*) FROM {}.vat_init WHERE header_id = $1", t.schema),
            &[&header.id]
        )
        .await,
        0
    );
    assert_eq!(
        t.count(
            &format!("SELECT COUNT(*) FROM {}.notes WHERE header_id = $1", t.schema),
            &[&header.id]
        )
        .await,
        0
    );
    assert_eq!(
        t.count("SELECT COUNT(*) FROM ilks WHERE identifier = $1", &[&ilk])
            .await,
        0
    );
    assert_eq!(repository.checked_count(header.id, TRANSFORMER).await.unwrap(), 0);

    t.teardown().await;
}

#[tokio::test]
async fn test_models_without_conflict_target_use_plain_insert() {
    let Some(t) = setup().await else { return };
    let repository = Repository::new(t.db.clone());
    let header = t.header(random_block()).await;

    let note = |body: &str| {
        InsertionModel::builder(&t.schema, "notes")
            .column("header_id", header.id)
            .column("body", body)
            .build()
            .unwrap()
    };

    repository
        .persist(header.id, "notes", vec![note("a"), note("b")], PersistMode::Normal)
        .await
        .unwrap();

    assert_eq!(
        t.count(
            &format!("SELECT COUNT(*) FROM {}.notes WHERE header_id = $1", t.schema),
            &[&header.id]
        )
        .await,
        2
    );

    t.teardown().await;
}
