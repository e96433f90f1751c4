//! Параллельные свертки списков поверх переиспользуемого пула воркеров
//!
//! # Features
//! - Пул с фиксированным числом долгоживущих воркеров и общей FIFO-очередью
//! - Батчи: результаты строго в порядке входа независимо от порядка завершения
//! - Сбой отдельного элемента не прерывает соседей: один агрегированный отчет на батч
//! - Редукции по разделам списка: maximum/minimum/all/any/join/filter/map
//! - Редьюсер работает и без пула, на одноразовых потоках по числу разделов
//! - Graceful shutdown: ожидающие батчи получают частичный результат
//! - Метрики пула и периодический мониторинг

mod batch;
pub mod errors;
pub mod model;
pub mod pool;
pub mod reduce;

pub use pool::{Config, ThreadPool, ThreadPoolInner};
pub use reduce::Reducer;
