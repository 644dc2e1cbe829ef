//! Interrupt capture queue.
//!
//! Interrupt handlers do one thing: record *what* happened and *when*.
//! They push an [`IrqEvent`] into a bounded channel and return.  The main
//! loop drains the channel once per iteration and does all real work.
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ Button ISR  │────▶│              │     │              │
//! │ Card detect │────▶│   IrqQueue   │────▶│  Main Loop   │
//! │ RTC alarm   │────▶│  (bounded)   │     │  (consumer)  │
//! │ Link RX     │────▶│              │     │              │
//! └─────────────┘     └──────────────┘     └──────────────┘
//! ```
//!
//! `try_send` never blocks; when the queue is full the event is dropped
//! and counted.  The queue is a value, so tests build their own instance;
//! firmware ISRs use the [`IRQ_EVENTS`] static.

use core::sync::atomic::{AtomicU32, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;

/// Maximum number of pending interrupt events.
pub const IRQ_QUEUE_CAP: usize = 16;

/// Events captured in interrupt context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqEvent {
    /// Button line changed level.  `pressed` is the debounced-at-source
    /// level (active low line already inverted).
    ButtonEdge { pressed: bool, at_ms: u32 },
    /// SD card inserted or removed.
    CardDetect { at_ms: u32 },
    /// RTC alarm matched.
    RtcAlarm,
    /// Companion UART has bytes waiting.
    LinkDataReady,
}

/// Bounded single-producer/single-consumer event channel.
pub struct IrqQueue {
    channel: Channel<CriticalSectionRawMutex, IrqEvent, IRQ_QUEUE_CAP>,
    dropped: AtomicU32,
}

impl IrqQueue {
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
            dropped: AtomicU32::new(0),
        }
    }

    /// Push from interrupt context.  Returns `false` if the queue was full
    /// and the event was dropped.
    pub fn push(&self, event: IrqEvent) -> bool {
        if self.channel.try_send(event).is_ok() {
            true
        } else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Pop the oldest pending event.
    pub fn pop(&self) -> Option<IrqEvent> {
        self.channel.try_receive().ok()
    }

    /// Drain every pending event in FIFO order.
    pub fn drain(&self, mut handler: impl FnMut(IrqEvent)) {
        while let Some(event) = self.pop() {
            handler(event);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.channel.is_empty()
    }

    pub fn len(&self) -> usize {
        self.channel.len()
    }

    /// Events lost to a full queue since boot.
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for IrqQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Queue written by the firmware's interrupt handlers.
pub static IRQ_EVENTS: IrqQueue = IrqQueue::new();

// ── ISR entry points ──────────────────────────────────────────
//
// Registered on the respective interrupt lines.  Each one is a single
// non-blocking push.

pub fn isr_button(pressed: bool, now_ms: u32) {
    IRQ_EVENTS.push(IrqEvent::ButtonEdge {
        pressed,
        at_ms: now_ms,
    });
}

pub fn isr_card_detect(now_ms: u32) {
    IRQ_EVENTS.push(IrqEvent::CardDetect { at_ms: now_ms });
}

pub fn isr_rtc_alarm() {
    IRQ_EVENTS.push(IrqEvent::RtcAlarm);
}

pub fn isr_link_rx() {
    IRQ_EVENTS.push(IrqEvent::LinkDataReady);
}
