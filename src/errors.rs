use std::any::Any;
use std::fmt;

use thiserror::Error;

/// Перехваченный сбой одной задачи внутри батча.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("task {index} panicked: {message}")]
    Panic { index: usize, message: String },
    #[error("task {index} aborted: {reason}")]
    Aborted { index: usize, reason: String },
}

impl TaskError {
    /// Слот, к которому относится сбой.
    pub fn index(&self) -> usize {
        match self {
            TaskError::Panic { index, .. } => *index,
            TaskError::Aborted { index, .. } => *index,
        }
    }
}

/// Ошибки конструирования пула. Проверяются до запуска воркеров.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("thread count must be at least 1")]
    ZeroThreads,
}

/// Единый агрегированный отчет о сбое одного батча.
///
/// Несет частичный буфер результатов (`None` значит слот не вычислен) и все
/// перехваченные сбои, так что валидные результаты не теряются даже при Err.
#[derive(Debug)]
pub struct BatchError<R> {
    /// Слоты результатов в порядке входа.
    pub completed: Vec<Option<R>>,
    /// Все перехваченные сбои задач батча.
    pub failures: Vec<TaskError>,
    /// true, если пул закрыли до завершения батча.
    pub shutdown: bool,
}

impl<R> BatchError<R> {
    /// Сколько задач батча успело завершиться (успехом или сбоем).
    pub fn finished(&self) -> usize {
        self.completed.iter().filter(|slot| slot.is_some()).count() + self.failures.len()
    }
}

impl<R> fmt::Display for BatchError<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.shutdown {
            write!(
                f,
                "pool closed after {}/{} batch tasks",
                self.finished(),
                self.completed.len()
            )
        } else {
            write!(
                f,
                "{} of {} batch task(s) failed",
                self.failures.len(),
                self.completed.len()
            )
        }
    }
}

impl<R: fmt::Debug> std::error::Error for BatchError<R> {}

/// Единый агрегированный отчет о сбое одного вызова редукции.
#[derive(Debug, Error)]
pub enum ReduceError {
    /// Часть разделов упала; остальные все равно были досчитаны.
    #[error("{} partition task(s) failed", .0.len())]
    Failed(Vec<TaskError>),
    /// Пул закрыли до того, как батч разделов завершился.
    #[error("pool closed after {completed}/{expected} partitions")]
    Shutdown { completed: usize, expected: usize },
}

/// Достает человекочитаемое сообщение из payload паники.
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(message) => (*message).to_string(),
            Err(_) => "non-string panic payload".to_string(),
        },
    }
}
