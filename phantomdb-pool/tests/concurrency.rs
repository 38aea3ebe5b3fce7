use std::{
    convert::Infallible,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use phantomdb_pool::{Error, ManageConnection, Pool, PoolConfig};

#[derive(Clone, Default)]
struct Counting {
    created: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl ManageConnection for Counting {
    type Connection = usize;
    type Error = Infallible;

    async fn connect(&self) -> Result<usize, Infallible> {
        tokio::time::sleep(Duration::from_millis(1)).await;
        Ok(self.created.fetch_add(1, Ordering::SeqCst))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn never_exceeds_capacity() {
    let manager = Counting::default();
    let pool = Pool::new(
        manager.clone(),
        PoolConfig::default()
            .with_min_connections(1)
            .with_max_connections(5)
            .with_acquire_timeout(Duration::from_secs(10)),
    );
    pool.warm_up().await.unwrap();
    let held = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let tasks: Vec<_> = (0..50)
        .map(|_| {
            let pool = pool.clone();
            let held = held.clone();
            let peak = peak.clone();
            tokio::spawn(async move {
                let conn = pool.get().await?;
                let now = held.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                assert!(pool.status().size() <= 5);
                tokio::time::sleep(Duration::from_millis(2)).await;
                held.fetch_sub(1, Ordering::SeqCst);
                drop(conn);
                Ok::<_, Error>(())
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }
    assert!(peak.load(Ordering::SeqCst) <= 5);
    assert!(manager.created.load(Ordering::SeqCst) <= 5);
    let status = pool.status();
    assert_eq!(status.in_use, 0);
    assert!(status.available <= 5);
    pool.close();
    assert_eq!(pool.status().size(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn close_under_load() {
    let pool = Pool::new(
        Counting::default(),
        PoolConfig::default()
            .with_min_connections(0)
            .with_max_connections(2)
            .with_acquire_timeout(Duration::from_secs(10)),
    );
    let tasks: Vec<_> = (0..20)
        .map(|_| {
            let pool = pool.clone();
            tokio::spawn(async move {
                match pool.get().await {
                    Ok(conn) => {
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        drop(conn);
                        Ok(())
                    }
                    Err(err) => Err(err),
                }
            })
        })
        .collect();
    tokio::time::sleep(Duration::from_millis(3)).await;
    pool.close();
    for task in tasks {
        match task.await.unwrap() {
            Ok(()) | Err(Error::PoolClosed) => {}
            Err(err) => panic!("unexpected error: {err}"),
        }
    }
    assert_eq!(pool.status().size(), 0);
}
