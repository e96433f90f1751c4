use std::{cmp::Ordering, fmt, sync::Arc};

use futures::future::join_all;
use tracing::debug;

use crate::{
    errors::{panic_message, ReduceError, TaskError},
    pool::ThreadPool,
};

/// Редьюсер списков: дробит вход на непрерывные разделы, считает локальную
/// свертку по каждому разделу и сводит частичные ответы в порядке разделов.
///
/// Стратегия исполнения фиксируется при конструировании: либо общий пул
/// воркеров, либо одноразовые blocking-потоки на каждый вызов. Оба пути
/// сходятся в одной схеме "разделы -> упорядоченные частичные -> свертка".
pub struct Reducer {
    pool: Option<ThreadPool>,
}

impl Reducer {
    /// Редьюсер без пула: на каждый вызов поднимается по одному
    /// одноразовому потоку на раздел.
    pub fn new() -> Self {
        Self { pool: None }
    }

    /// Редьюсер поверх общего пула воркеров.
    pub fn with_pool(pool: ThreadPool) -> Self {
        Self { pool: Some(pool) }
    }

    /// Общая схема всех редукций: `task` считает локальную свертку одного
    /// раздела, `collect` сводит частичные результаты в порядке разделов.
    ///
    /// `threads` обрезается в диапазон `[1, len]`; 0 поднимается до 1. Пустой
    /// вход исполняется одним пустым разделом и дает нейтральный элемент
    /// операции.
    pub async fn reduce<T, R, M, C>(
        &self,
        threads: usize,
        values: Vec<T>,
        task: M,
        collect: C,
    ) -> Result<R, ReduceError>
    where
        T: Send + 'static,
        R: Send + 'static,
        M: Fn(Vec<T>) -> R + Send + Sync + 'static,
        C: FnOnce(Vec<R>) -> R + Send,
    {
        let parts = effective_parallelism(threads, values.len());
        let chunks = partition(values, parts);

        let partials = match &self.pool {
            Some(pool) => {
                debug!(partitions = parts, "dispatching partitions to pool");
                match pool.map(task, chunks).await {
                    Ok(partials) => partials,
                    Err(batch) => {
                        return Err(if batch.shutdown {
                            ReduceError::Shutdown {
                                completed: batch
                                    .completed
                                    .iter()
                                    .filter(|slot| slot.is_some())
                                    .count(),
                                expected: parts,
                            }
                        } else {
                            ReduceError::Failed(batch.failures)
                        });
                    }
                }
            }
            None => {
                debug!(partitions = parts, "spawning one-shot partition threads");
                let task = Arc::new(task);
                let handles: Vec<_> = chunks
                    .into_iter()
                    .map(|chunk| {
                        let task = Arc::clone(&task);
                        tokio::task::spawn_blocking(move || (*task)(chunk))
                    })
                    .collect();

                // join_all дожидается каждого потока, даже когда часть уже упала
                let joined = join_all(handles).await;
                let mut partials = Vec::with_capacity(parts);
                let mut failures = Vec::new();
                for (index, outcome) in joined.into_iter().enumerate() {
                    match outcome {
                        Ok(partial) => partials.push(partial),
                        Err(error) => {
                            if error.is_panic() {
                                failures.push(TaskError::Panic {
                                    index,
                                    message: panic_message(error.into_panic()),
                                });
                            } else {
                                failures.push(TaskError::Aborted {
                                    index,
                                    reason: error.to_string(),
                                });
                            }
                        }
                    }
                }
                if !failures.is_empty() {
                    return Err(ReduceError::Failed(failures));
                }
                partials
            }
        };

        Ok(collect(partials))
    }

    /// Максимум по компаратору. `None` для пустого входа.
    pub async fn maximum<T, F>(
        &self,
        threads: usize,
        values: Vec<T>,
        compare: F,
    ) -> Result<Option<T>, ReduceError>
    where
        T: Send + 'static,
        F: Fn(&T, &T) -> Ordering + Send + Sync + 'static,
    {
        let compare = Arc::new(compare);
        let local = {
            let compare = Arc::clone(&compare);
            move |chunk: Vec<T>| chunk.into_iter().max_by(|a, b| (*compare)(a, b))
        };
        self.reduce(threads, values, local, move |partials| {
            partials.into_iter().flatten().max_by(|a, b| (*compare)(a, b))
        })
        .await
    }

    /// Минимум по компаратору. `None` для пустого входа.
    pub async fn minimum<T, F>(
        &self,
        threads: usize,
        values: Vec<T>,
        compare: F,
    ) -> Result<Option<T>, ReduceError>
    where
        T: Send + 'static,
        F: Fn(&T, &T) -> Ordering + Send + Sync + 'static,
    {
        let compare = Arc::new(compare);
        let local = {
            let compare = Arc::clone(&compare);
            move |chunk: Vec<T>| chunk.into_iter().min_by(|a, b| (*compare)(a, b))
        };
        self.reduce(threads, values, local, move |partials| {
            partials.into_iter().flatten().min_by(|a, b| (*compare)(a, b))
        })
        .await
    }

    /// true, если предикат верен на каждом элементе. Пустой вход -> true.
    ///
    /// Каждый раздел вычисляется целиком: short-circuit не пересекает
    /// границу раздела, как и в последовательном проходе по разделу.
    pub async fn all<T, P>(
        &self,
        threads: usize,
        values: Vec<T>,
        predicate: P,
    ) -> Result<bool, ReduceError>
    where
        T: Send + 'static,
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.reduce(
            threads,
            values,
            move |chunk| chunk.iter().all(|value| predicate(value)),
            |partials| partials.into_iter().all(|ok| ok),
        )
        .await
    }

    /// true, если предикат верен хотя бы на одном элементе. Пустой вход -> false.
    pub async fn any<T, P>(
        &self,
        threads: usize,
        values: Vec<T>,
        predicate: P,
    ) -> Result<bool, ReduceError>
    where
        T: Send + 'static,
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.reduce(
            threads,
            values,
            move |chunk| chunk.iter().any(|value| predicate(value)),
            |partials| partials.into_iter().any(|ok| ok),
        )
        .await
    }

    /// Конкатенация строковых представлений всех элементов в исходном порядке.
    pub async fn join<T>(&self, threads: usize, values: Vec<T>) -> Result<String, ReduceError>
    where
        T: fmt::Display + Send + 'static,
    {
        self.reduce(
            threads,
            values,
            |chunk| {
                chunk
                    .into_iter()
                    .map(|value| value.to_string())
                    .collect::<String>()
            },
            |partials| partials.concat(),
        )
        .await
    }

    /// Элементы, прошедшие предикат; относительный порядок сохраняется.
    pub async fn filter<T, P>(
        &self,
        threads: usize,
        values: Vec<T>,
        predicate: P,
    ) -> Result<Vec<T>, ReduceError>
    where
        T: Send + 'static,
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.reduce(
            threads,
            values,
            move |chunk| {
                chunk
                    .into_iter()
                    .filter(|value| predicate(value))
                    .collect::<Vec<_>>()
            },
            |partials| partials.into_iter().flatten().collect(),
        )
        .await
    }

    /// Образ списка под `f`; порядок результатов соответствует входу.
    pub async fn map<T, U, F>(
        &self,
        threads: usize,
        values: Vec<T>,
        f: F,
    ) -> Result<Vec<U>, ReduceError>
    where
        T: Send + 'static,
        U: Send + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        self.reduce(
            threads,
            values,
            move |chunk| chunk.into_iter().map(|value| f(value)).collect::<Vec<_>>(),
            |partials| partials.into_iter().flatten().collect(),
        )
        .await
    }
}

impl Default for Reducer {
    fn default() -> Self {
        Self::new()
    }
}

/// Эффективная степень параллелизма: `threads`, обрезанное в `[1, len]`.
/// 0 поднимается до 1; для пустого входа остается один пустой раздел.
pub fn effective_parallelism(threads: usize, len: usize) -> usize {
    threads.clamp(1, len.max(1))
}

/// Дробит список на `parts` непрерывных кусков, вместе покрывающих вход
/// ровно один раз и в исходном порядке. Первые `len % parts` кусков
/// получают на один элемент больше.
pub fn partition<T>(values: Vec<T>, parts: usize) -> Vec<Vec<T>> {
    debug_assert!(parts >= 1);
    let base = values.len() / parts;
    let extra = values.len() % parts;

    let mut chunks = Vec::with_capacity(parts);
    let mut rest = values;
    for index in 0..parts {
        let size = base + usize::from(index < extra);
        let tail = rest.split_off(size);
        chunks.push(rest);
        rest = tail;
    }
    chunks
}
