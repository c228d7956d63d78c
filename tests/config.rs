use queuectl::sql::config::set_config;
use queuectl::ConfigKey;

mod helpers;

#[tokio::test]
async fn config_falls_back_to_defaults() {
    helpers::with_test_db(|test_db| async move {
        let utils = test_db.worker_utils();
        assert_eq!(utils.get_config(ConfigKey::DefaultMaxRetries).await.unwrap(), 3);
        assert_eq!(utils.get_config(ConfigKey::BackoffBase).await.unwrap(), 2);
    })
    .await;
}

#[tokio::test]
async fn config_set_overwrites_value() {
    helpers::with_test_db(|test_db| async move {
        let utils = test_db.worker_utils();
        utils.set_config(ConfigKey::BackoffBase, 3).await.unwrap();
        utils.set_config(ConfigKey::BackoffBase, 4).await.unwrap();

        assert_eq!(utils.get_config(ConfigKey::BackoffBase).await.unwrap(), 4);
        assert_eq!(utils.get_config(ConfigKey::DefaultMaxRetries).await.unwrap(), 3);
    })
    .await;
}

#[tokio::test]
async fn unparsable_value_uses_default() {
    helpers::with_test_db(|test_db| async move {
        set_config(&test_db.pool, "backoff_base", "fast")
            .await
            .unwrap();

        let utils = test_db.worker_utils();
        assert_eq!(utils.get_config(ConfigKey::BackoffBase).await.unwrap(), 2);
    })
    .await;
}

#[test]
fn config_keys_parse() {
    assert_eq!("backoff_base".parse::<ConfigKey>(), Ok(ConfigKey::BackoffBase));
    assert_eq!("default_max_retries".parse::<ConfigKey>(), Ok(ConfigKey::DefaultMaxRetries));
    assert!("max_workers".parse::<ConfigKey>().is_err());
}
