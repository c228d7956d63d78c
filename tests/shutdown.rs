use std::sync::Arc;
use std::time::Duration;

use queuectl::{JobState, WorkerState};
use tokio_util::sync::CancellationToken;

mod helpers;

#[tokio::test]
async fn idle_worker_stops_on_shutdown() {
    helpers::with_test_db(|test_db| async move {
        let worker = Arc::new(test_db.create_worker_options().init().await.unwrap());
        let handle = tokio::spawn({
            let worker = worker.clone();
            async move { worker.run().await }
        });

        let mut state = worker.subscribe_state();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(worker.state(), WorkerState::Running);

        worker.request_shutdown();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("Worker should stop promptly")
            .unwrap();

        state
            .wait_for(|s| *s == WorkerState::Stopped)
            .await
            .unwrap();
    })
    .await;
}

#[tokio::test]
async fn draining_worker_waits_for_running_job() {
    helpers::with_test_db(|test_db| async move {
        test_db.add_job("slow", "sleep 1", 0).await;
        test_db.add_job("next", "true", 0).await;

        let worker = Arc::new(test_db.create_worker_options().init().await.unwrap());
        let handle = tokio::spawn({
            let worker = worker.clone();
            async move { worker.run().await }
        });

        let db = &test_db;
        let claimed = helpers::wait_until(Duration::from_secs(5), || async move {
            db.get_job("slow").await.state() == &JobState::Processing
        })
        .await;
        assert!(claimed, "Worker should claim the slow job");

        worker.request_shutdown();
        let mut state = worker.subscribe_state();
        tokio::time::timeout(
            Duration::from_millis(500),
            state.wait_for(|s| *s == WorkerState::Draining),
        )
        .await
        .expect("Worker should start draining")
        .unwrap();
        assert_eq!(test_db.get_job("slow").await.state(), &JobState::Processing);
        assert!(!handle.is_finished());

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("Worker should stop after the job")
            .unwrap();

        assert_eq!(worker.state(), WorkerState::Stopped);
        assert_eq!(test_db.get_job("slow").await.state(), &JobState::Completed);
        assert_eq!(test_db.get_job("next").await.state(), &JobState::Pending);
    })
    .await;
}

#[tokio::test]
async fn shared_token_stops_worker() {
    helpers::with_test_db(|test_db| async move {
        let token = CancellationToken::new();
        let worker = test_db
            .create_worker_options()
            .shutdown_token(token.clone())
            .init()
            .await
            .unwrap();

        token.cancel();
        tokio::time::timeout(Duration::from_secs(2), worker.run())
            .await
            .expect("Worker should not start when already cancelled");
        assert_eq!(worker.state(), WorkerState::Stopped);
    })
    .await;
}

#[tokio::test]
async fn cancelled_worker_leaves_pending_jobs_unclaimed() {
    helpers::with_test_db(|test_db| async move {
        test_db.add_job("waiting", "true", 0).await;
        let token = CancellationToken::new();
        let worker = test_db
            .create_worker_options()
            .shutdown_token(token.clone())
            .init()
            .await
            .unwrap();

        token.cancel();
        tokio::time::timeout(Duration::from_secs(2), worker.run())
            .await
            .expect("Worker should stop without claiming");
        worker.run_once().await.unwrap();

        let job = test_db.get_job("waiting").await;
        assert_eq!(job.state(), &JobState::Pending);
        assert!(job.worker().is_none());
        assert_eq!(worker.state(), WorkerState::Stopped);
    })
    .await;
}
