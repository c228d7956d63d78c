use chrono::Utc;
use queuectl::sql::get_job::get_job;
use queuectl::JobState;

mod helpers;

#[tokio::test]
async fn list_returns_newest_first() {
    helpers::with_test_db(|test_db| async move {
        test_db.add_job("a", "true", 3).await;
        test_db.add_job("b", "true", 3).await;
        test_db.add_job("c", "true", 3).await;

        let jobs = test_db.worker_utils().list_jobs(None).await.unwrap();
        let ids: Vec<&str> = jobs.iter().map(|j| j.id().as_str()).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
    })
    .await;
}

#[tokio::test]
async fn list_filters_by_state_and_summary_counts() {
    helpers::with_test_db(|test_db| async move {
        test_db.add_job("a", "true", 3).await;
        test_db.add_job("b", "true", 3).await;
        test_db.add_job("c", "exit 1", 0).await;
        get_job(&test_db.pool, "worker", Utc::now())
            .await
            .unwrap()
            .expect("Job should be claimed");

        let utils = test_db.worker_utils();
        let processing = utils.list_jobs(Some(JobState::Processing)).await.unwrap();
        assert_eq!(processing.len(), 1);
        assert_eq!(processing[0].id(), "a");

        let pending = utils.list_jobs(Some(JobState::Pending)).await.unwrap();
        assert_eq!(pending.len(), 2);

        let summary = utils.summary().await.unwrap();
        assert_eq!(summary.get(JobState::Pending), 2);
        assert_eq!(summary.get(JobState::Processing), 1);
        assert_eq!(summary.get(JobState::Completed), 0);
        assert_eq!(summary.get(JobState::Dead), 0);
        assert_eq!(summary.total(), 3);

        assert!(utils.get_job("a").await.unwrap().is_some());
        assert!(utils.get_job("zzz").await.unwrap().is_none());
    })
    .await;
}

#[tokio::test]
async fn summary_serializes_every_state() {
    helpers::with_test_db(|test_db| async move {
        let summary = test_db.worker_utils().summary().await.unwrap();
        let value = serde_json::to_value(summary).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"pending": 0, "processing": 0, "completed": 0, "dead": 0})
        );
    })
    .await;
}
