use std::pin::Pin;
use std::task::{Context, Poll};
use bytes::Bytes;
use futures::Stream;
use pin_project_lite::pin_project;
use super::progress::ProgressCallback;

pin_project! {
    /// 包装请求体，每交出一个 chunk 就回报累计字节数
    pub struct ProgressStream<S> {
        #[pin]
        inner: S,
        callback: ProgressCallback,
        bytes_sent: u64,
        total: Option<u64>,
    }
}

impl<S> ProgressStream<S> {
    pub fn new(inner: S, total: Option<u64>, callback: ProgressCallback) -> Self {
        Self {
            inner,
            callback,
            bytes_sent: 0,
            total,
        }
    }
}

impl<S> Stream for ProgressStream<S>
where
    S: Stream<Item = std::io::Result<Bytes>>
{
    type Item = std::io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();

        match this.inner.poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                if !chunk.is_empty() {
                    *this.bytes_sent += chunk.len() as u64;
                    (this.callback)(*this.bytes_sent, *this.total);
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            other => other,
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}
