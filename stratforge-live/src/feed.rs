//! Bar feeds — where the live engine waits for the next bar.
//!
//! `next_bar` is a suspension point: a feed with nothing to deliver simply
//! doesn't return, and the engine keeps waiting (stop requests still get
//! through). `None` means the feed is closed for good.

use std::collections::VecDeque;

use async_trait::async_trait;
use stratforge_core::domain::Bar;
use tokio::sync::mpsc;

#[async_trait]
pub trait BarFeed: Send {
    /// Wait for the next completed bar. `None` once the feed has closed.
    async fn next_bar(&mut self) -> Option<Bar>;

    /// True once the bar most recently returned was the last one this feed
    /// will ever deliver. Open-ended feeds always return false.
    fn is_exhausted(&self) -> bool {
        false
    }
}

/// Bars pushed by a market data task over an mpsc channel.
#[derive(Debug)]
pub struct ChannelFeed {
    rx: mpsc::Receiver<Bar>,
}

impl ChannelFeed {
    pub fn new(rx: mpsc::Receiver<Bar>) -> Self {
        Self { rx }
    }

    /// A bounded channel and the feed reading from it.
    pub fn channel(capacity: usize) -> (mpsc::Sender<Bar>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self::new(rx))
    }
}

#[async_trait]
impl BarFeed for ChannelFeed {
    async fn next_bar(&mut self) -> Option<Bar> {
        self.rx.recv().await
    }
}

/// A finite historical series replayed bar by bar.
#[derive(Debug, Clone)]
pub struct ReplayFeed {
    bars: VecDeque<Bar>,
}

impl ReplayFeed {
    pub fn new(bars: impl IntoIterator<Item = Bar>) -> Self {
        Self {
            bars: bars.into_iter().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.bars.len()
    }
}

#[async_trait]
impl BarFeed for ReplayFeed {
    async fn next_bar(&mut self) -> Option<Bar> {
        self.bars.pop_front()
    }

    fn is_exhausted(&self) -> bool {
        self.bars.is_empty()
    }
}
