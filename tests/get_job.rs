use chrono::{Duration, Utc};
use futures::future::join_all;
use queuectl::sql::complete_job::complete_job;
use queuectl::sql::get_job::get_job;
use queuectl::JobState;

mod helpers;

#[tokio::test]
async fn only_one_concurrent_claim_wins() {
    helpers::with_test_db(|test_db| async move {
        test_db.add_job("contended", "true", 3).await;

        let now = Utc::now();
        let worker_ids: Vec<String> = (0..8).map(|i| format!("worker_{i}")).collect();
        let claims = join_all(
            worker_ids
                .iter()
                .map(|worker_id| get_job(&test_db.pool, worker_id, now)),
        )
        .await;

        let winners: Vec<_> = claims
            .into_iter()
            .filter_map(|claim| claim.expect("Claim should not fail"))
            .collect();
        assert_eq!(winners.len(), 1);

        let job = test_db.get_job("contended").await;
        assert_eq!(job.state(), &JobState::Processing);
        assert_eq!(job.worker(), winners[0].worker());
    })
    .await;
}

#[tokio::test]
async fn claims_oldest_job_first() {
    helpers::with_test_db(|test_db| async move {
        test_db.add_job("first", "true", 3).await;
        test_db.add_job("second", "true", 3).await;
        test_db.add_job("third", "true", 3).await;

        let now = Utc::now();
        let mut claimed = Vec::new();
        while let Some(job) = get_job(&test_db.pool, "worker", now).await.unwrap() {
            claimed.push(job.id().clone());
        }
        assert_eq!(claimed, vec!["first", "second", "third"]);
    })
    .await;
}

#[tokio::test]
async fn claim_marks_job_processing() {
    helpers::with_test_db(|test_db| async move {
        let added = test_db.add_job("job", "true", 3).await;

        let now = Utc::now();
        let job = get_job(&test_db.pool, "worker_a", now)
            .await
            .unwrap()
            .expect("Job should be claimed");

        assert_eq!(job.id(), "job");
        assert_eq!(job.state(), &JobState::Processing);
        assert_eq!(job.worker().as_deref(), Some("worker_a"));
        assert_eq!(job.attempts(), &0);
        assert_eq!(job.available_at(), added.available_at());
        assert!(job.updated_at() >= added.updated_at());
    })
    .await;
}

#[tokio::test]
async fn empty_queue_yields_no_job() {
    helpers::with_test_db(|test_db| async move {
        let job = get_job(&test_db.pool, "worker", Utc::now()).await.unwrap();
        assert!(job.is_none());
    })
    .await;
}

#[tokio::test]
async fn job_in_backoff_is_not_claimed() {
    helpers::with_test_db(|test_db| async move {
        test_db.add_job("later", "true", 3).await;
        sqlx::query("update jobs set available_at = $1")
            .bind((Utc::now() + Duration::seconds(60)).timestamp())
            .execute(&test_db.pool)
            .await
            .unwrap();

        assert!(get_job(&test_db.pool, "worker", Utc::now())
            .await
            .unwrap()
            .is_none());
        assert!(
            get_job(&test_db.pool, "worker", Utc::now() + Duration::seconds(61))
                .await
                .unwrap()
                .is_some()
        );
    })
    .await;
}

#[tokio::test]
async fn mutations_from_another_worker_are_ignored() {
    helpers::with_test_db(|test_db| async move {
        test_db.add_job("job", "true", 3).await;
        get_job(&test_db.pool, "owner", Utc::now())
            .await
            .unwrap()
            .expect("Job should be claimed");

        complete_job(&test_db.pool, "job", "intruder", Utc::now())
            .await
            .unwrap();

        let job = test_db.get_job("job").await;
        assert_eq!(job.state(), &JobState::Processing);
        assert_eq!(job.worker().as_deref(), Some("owner"));

        complete_job(&test_db.pool, "job", "owner", Utc::now())
            .await
            .unwrap();
        let job = test_db.get_job("job").await;
        assert_eq!(job.state(), &JobState::Completed);
        assert!(job.worker().is_none());
    })
    .await;
}
