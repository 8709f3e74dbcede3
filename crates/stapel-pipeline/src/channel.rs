// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Progress channel: an ordered, bounded, single-consumer event stream from a
// running job to whatever transport is serving the client.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use stapel_core::ProgressEvent;
use stapel_core::error::{Result, StapelError};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::trace;

/// Constructor for a connected sink/stream pair.
pub struct ProgressChannel;

impl ProgressChannel {
    /// Open a channel buffering at most `capacity` events (minimum 1).
    ///
    /// A full buffer makes [`ProgressSink::emit`] wait, so a slow client
    /// slows the job instead of growing memory.
    pub fn open(capacity: usize) -> (ProgressSink, ProgressStream) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            ProgressSink {
                sender: Some(sender),
            },
            ProgressStream {
                inner: ReceiverStream::new(receiver),
            },
        )
    }
}

/// Producer half, owned by the job.
#[derive(Debug)]
pub struct ProgressSink {
    sender: Option<mpsc::Sender<ProgressEvent>>,
}

impl ProgressSink {
    /// Send one event, waiting for buffer space if needed.
    ///
    /// Fails with [`StapelError::ChannelClosed`] once the consumer has gone
    /// away or the sink has been closed.
    pub async fn emit(&self, event: ProgressEvent) -> Result<()> {
        let Some(sender) = &self.sender else {
            return Err(StapelError::ChannelClosed);
        };
        trace!(kind = event.kind(), "emit");
        sender
            .send(event)
            .await
            .map_err(|_| StapelError::ChannelClosed)
    }

    /// Stop producing. The stream ends after draining buffered events.
    /// Calling this more than once has no further effect.
    pub fn close(&mut self) {
        self.sender = None;
    }

    pub fn is_closed(&self) -> bool {
        self.sender.as_ref().is_none_or(|s| s.is_closed())
    }
}

/// Consumer half: a lazy, finite stream of events in emission order.
///
/// Ends when the sink is closed or dropped. Dropping the stream is how a
/// client cancels the job.
#[derive(Debug)]
pub struct ProgressStream {
    inner: ReceiverStream<ProgressEvent>,
}

impl ProgressStream {
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        self.inner.as_mut().recv().await
    }
}

impl Stream for ProgressStream {
    type Item = ProgressEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
