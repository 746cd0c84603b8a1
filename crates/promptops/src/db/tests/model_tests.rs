use super::*;
use crate::db::queries::models::NewModelParams;
use crate::test_both_dbs;
use promptops_api::{ModelProvider, ModelTier};
use pretty_assertions::assert_eq;

test_both_dbs!(
    test_initialize_models_seeds_once,
    test_initialize_models_seeds_once_postgres,
    test_initialize_models_seeds_once_sqlite
);

async fn test_initialize_models_seeds_once(db: Arc<Database>) {
    db.initialize_models().await.unwrap();
    let seeded = db.list_models().await.unwrap();
    assert!(!seeded.is_empty());

    // Disable one model, as an admin would, then re-run startup seeding.
    let disabled = seeded.first().unwrap();
    db.set_model_enabled(disabled.id, false).await.unwrap();
    db.initialize_models().await.unwrap();

    let models = db.list_models().await.unwrap();
    assert_eq!(models.len(), seeded.len());
    assert!(!db.get_model(disabled.id).await.unwrap().unwrap().enabled);
}

test_both_dbs!(
    test_create_and_look_up_models,
    test_create_and_look_up_models_postgres,
    test_create_and_look_up_models_sqlite
);

async fn test_create_and_look_up_models(db: Arc<Database>) {
    let model = db
        .create_model(NewModelParams {
            name: "prompt-polisher-1".to_string(),
            provider: ModelProvider::OpenAi,
            tier: ModelTier::Pro,
            enabled: true,
        })
        .await
        .unwrap();
    assert_eq!(model.provider, "open_ai");
    assert_eq!(model.tier, "pro");

    let by_name = db
        .get_model_by_name("prompt-polisher-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_name, model);
    assert_eq!(db.get_model(model.id).await.unwrap().unwrap(), model);
    assert!(db.get_model_by_name("missing").await.unwrap().is_none());

    db.set_model_enabled(model.id, false).await.unwrap();
    assert!(!db.get_model(model.id).await.unwrap().unwrap().enabled);
    assert!(db.set_model_enabled(ModelId(999), true).await.is_err());
}
