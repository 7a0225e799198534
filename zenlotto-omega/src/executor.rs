use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::Arc;

use anyhow::{Context, Result};
use rayon::prelude::*;

use crate::config::EngineConfig;

/// Executors at or beyond this depth run their work inline.
pub const MAX_DEPTH: usize = 2;

/// Worker pool whose tasks may themselves fan out one level deeper.
///
/// All levels share one rayon pool; `nested()` hands a task an executor for
/// its own sub-work, and anything nested past [`MAX_DEPTH`] runs sequentially
/// instead of spawning more.
#[derive(Clone)]
pub struct Executor {
    pool: Option<Arc<rayon::ThreadPool>>,
    workers: usize,
    depth: usize,
}

impl Executor {
    pub fn new(workers: usize) -> Result<Self> {
        let workers = workers.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("omega-worker-{i}"))
            .build()
            .context("No se pudo crear el pool de trabajadores")?;
        log::debug!("Pool de {workers} trabajadores creado");
        Ok(Self {
            pool: Some(Arc::new(pool)),
            workers,
            depth: 0,
        })
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        Self::new(config.worker_count())
    }

    /// Runs everything on the calling thread.
    pub fn sequential() -> Self {
        Self {
            pool: None,
            workers: 1,
            depth: 0,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Executor for work submitted from inside one of this executor's tasks.
    pub fn nested(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            workers: self.workers,
            depth: self.depth + 1,
        }
    }

    pub fn is_parallel(&self) -> bool {
        self.pool.is_some() && self.depth < MAX_DEPTH
    }

    fn parallel_pool(&self) -> Option<&rayon::ThreadPool> {
        if self.depth < MAX_DEPTH {
            self.pool.as_deref()
        } else {
            None
        }
    }

    /// Applies `f` to every item; results in submission order.
    pub fn map<T, R, F>(&self, items: Vec<T>, f: F) -> Vec<R>
    where
        T: Send,
        R: Send,
        F: Fn(T) -> R + Sync + Send,
    {
        match self.parallel_pool() {
            Some(pool) => pool.install(|| items.into_par_iter().map(&f).collect()),
            None => items.into_iter().map(f).collect(),
        }
    }

    /// Like [`map`](Self::map), but a failing or panicking item becomes `None`
    /// after its error is logged, so one bad unit never aborts the batch.
    pub fn try_map<T, R, F>(&self, items: Vec<T>, label: &str, f: F) -> Vec<Option<R>>
    where
        T: Send,
        R: Send,
        F: Fn(T) -> Result<R> + Sync + Send,
    {
        self.map(items, |item| isolate(label, || f(item)))
    }

    /// Fault-isolated like [`try_map`](Self::try_map), but hands each result to
    /// `on_result` on the calling thread as soon as it arrives, with its
    /// submission index. Falls back to submission order when called from a
    /// pool thread, which must not block waiting on its own pool.
    pub fn for_each_unordered<T, R, F, C>(&self, items: Vec<T>, label: &str, f: F, mut on_result: C)
    where
        T: Send,
        R: Send,
        F: Fn(T) -> Result<R> + Sync + Send,
        C: FnMut(usize, Option<R>),
    {
        let pool = match self.parallel_pool() {
            Some(pool) if rayon::current_thread_index().is_none() => pool,
            _ => {
                for (i, result) in self.try_map(items, label, f).into_iter().enumerate() {
                    on_result(i, result);
                }
                return;
            }
        };

        let (tx, rx) = mpsc::channel::<(usize, Option<R>)>();
        let f = &f;
        pool.in_place_scope(|scope| {
            for (i, item) in items.into_iter().enumerate() {
                let tx = tx.clone();
                scope.spawn(move |_| {
                    let result = isolate(label, || f(item));
                    let _ = tx.send((i, result));
                });
            }
            drop(tx);
            for (i, result) in rx {
                on_result(i, result);
            }
        });
    }
}

fn isolate<R>(label: &str, work: impl FnOnce() -> Result<R>) -> Option<R> {
    match catch_unwind(AssertUnwindSafe(work)) {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            log::error!("{label}: fallo en el trabajador: {e:#}");
            None
        }
        Err(panic) => {
            let msg = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "pánico sin mensaje".to_string());
            log::error!("{label}: pánico en el trabajador: {msg}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_map_preserves_order() {
        let exec = Executor::new(4).unwrap();
        let out = exec.map((0..100).collect(), |x: u64| x * 2);
        assert_eq!(out, (0..100).map(|x| x * 2).collect::<Vec<_>>());
    }

    #[test]
    fn test_try_map_isolates_failures() {
        let exec = Executor::new(2).unwrap();
        let out = exec.try_map((0..6).collect(), "prueba", |x: u32| {
            if x == 2 {
                anyhow::bail!("fallo controlado");
            }
            if x == 4 {
                panic!("pánico controlado");
            }
            Ok(x)
        });
        assert_eq!(out, vec![Some(0), Some(1), None, Some(3), None, Some(5)]);
    }

    #[test]
    fn test_unordered_delivers_every_index() {
        let exec = Executor::new(3).unwrap();
        let mut seen = vec![None; 20];
        exec.for_each_unordered((0..20).collect(), "prueba", |x: usize| Ok(x * x), |i, r| {
            seen[i] = r;
        });
        assert!(seen.iter().enumerate().all(|(i, r)| *r == Some(i * i)));
    }

    #[test]
    fn test_nested_depth_cap() {
        let exec = Executor::new(2).unwrap();
        assert!(exec.is_parallel());
        assert!(exec.nested().is_parallel());
        assert!(!exec.nested().nested().is_parallel());
        assert_eq!(exec.nested().nested().depth(), 2);
    }

    #[test]
    fn test_nested_work_inside_tasks() {
        let exec = Executor::new(2).unwrap();
        let calls = AtomicUsize::new(0);
        let sums = exec.map((0..4).collect(), |x: u64| {
            let inner = exec.nested();
            let parts = inner.map((0..10).collect(), |y: u64| {
                calls.fetch_add(1, Ordering::Relaxed);
                x + y
            });
            parts.iter().sum::<u64>()
        });
        assert_eq!(sums, vec![45, 55, 65, 75]);
        assert_eq!(calls.load(Ordering::Relaxed), 40);
    }

    #[test]
    fn test_unordered_from_worker_thread_falls_back() {
        let exec = Executor::new(2).unwrap();
        let totals = exec.map(vec![1u64, 2], |x| {
            let mut total = 0;
            exec.nested().for_each_unordered(vec![x, x, x], "anidado", |v| Ok(v), |_, r| {
                total += r.unwrap_or(0);
            });
            total
        });
        assert_eq!(totals, vec![3, 6]);
    }

    #[test]
    fn test_sequential() {
        let exec = Executor::sequential();
        assert!(!exec.is_parallel());
        assert_eq!(exec.map(vec![1, 2, 3], |x: i32| x + 1), vec![2, 3, 4]);
    }
}
