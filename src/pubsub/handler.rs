use std::{fmt, future::Future, sync::Arc};

use futures::future::BoxFuture;

/// Обработчик входящих сообщений `listen`: `(channel, data)`.
///
/// Вызывается как побочный эффект перед выдачей записи; асинхронный
/// обработчик дожидается завершения.
pub enum Handler<T> {
    Sync(Arc<dyn Fn(&str, &T) + Send + Sync>),
    Async(Arc<dyn Fn(String, T) -> BoxFuture<'static, ()> + Send + Sync>),
}

impl<T> Handler<T> {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&str, &T) + Send + Sync + 'static,
    {
        Handler::Sync(Arc::new(f))
    }

    pub fn from_async<F, Fut>(f: F) -> Self
    where
        F: Fn(String, T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Handler::Async(Arc::new(move |channel, data| Box::pin(f(channel, data))))
    }
}

impl<T: Clone> Handler<T> {
    pub(crate) async fn call(
        &self,
        channel: &str,
        data: &T,
    ) {
        match self {
            Handler::Sync(f) => f(channel, data),
            Handler::Async(f) => f(channel.to_string(), data.clone()).await,
        }
    }
}

impl<T> Clone for Handler<T> {
    fn clone(&self) -> Self {
        match self {
            Handler::Sync(f) => Handler::Sync(f.clone()),
            Handler::Async(f) => Handler::Async(f.clone()),
        }
    }
}

impl<T> fmt::Debug for Handler<T> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Handler::Sync(_) => f.write_str("Handler::Sync"),
            Handler::Async(_) => f.write_str("Handler::Async"),
        }
    }
}
