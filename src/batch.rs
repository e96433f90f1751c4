use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Mutex,
};

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::errors::TaskError;

/// Буфер результатов одного батча: слоты по индексу назначения, копилка
/// сбоев и счетчик попыток. Уведомление о завершении идет через собственный
/// Notify батча, а не через глобальное состояние пула, поэтому параллельные
/// батчи не конкурируют за одно условие ожидания.
pub(crate) struct BatchBuffer<R> {
    slots: Mutex<Vec<Option<R>>>,
    failures: Mutex<Vec<TaskError>>,
    finished: AtomicUsize,
    total: usize,
    done: Notify,
}

impl<R> BatchBuffer<R> {
    pub(crate) fn new(total: usize) -> Self {
        let mut slots = Vec::with_capacity(total);
        slots.resize_with(total, || None);
        Self {
            slots: Mutex::new(slots),
            failures: Mutex::new(Vec::new()),
            finished: AtomicUsize::new(0),
            total,
            done: Notify::new(),
        }
    }

    /// Записывает успешный результат в свой слот. Каждый слот заполняется
    /// не более одного раза за батч.
    pub(crate) fn fulfill(&self, index: usize, value: R) {
        {
            let mut slots = self.slots.lock().unwrap();
            slots[index] = Some(value);
        }
        self.mark_attempted();
    }

    /// Фиксирует сбой задачи; ее слот остается пустым.
    pub(crate) fn fail(&self, error: TaskError) {
        self.failures.lock().unwrap().push(error);
        self.mark_attempted();
    }

    fn mark_attempted(&self) {
        if self.finished.fetch_add(1, Ordering::AcqRel) + 1 == self.total {
            self.done.notify_one();
        }
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.finished.load(Ordering::Acquire) >= self.total
    }

    /// Ждет, пока все задачи батча будут испробованы либо пул закроется.
    pub(crate) async fn wait(&self, shutdown: &CancellationToken) {
        while !self.is_complete() && !shutdown.is_cancelled() {
            tokio::select! {
                _ = self.done.notified() => {}
                _ = shutdown.cancelled() => {}
            }
        }
    }

    /// Забирает накопленное состояние батча. Длина вектора слотов
    /// сохраняется, чтобы опоздавшая in-flight задача не писала мимо буфера.
    pub(crate) fn drain(&self) -> (Vec<Option<R>>, Vec<TaskError>, bool) {
        let slots = self
            .slots
            .lock()
            .unwrap()
            .iter_mut()
            .map(Option::take)
            .collect();
        let failures = self.failures.lock().unwrap().drain(..).collect();
        (slots, failures, self.is_complete())
    }
}
