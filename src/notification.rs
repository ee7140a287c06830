//! Push protocol shared by upstream and downstream.
//!
//! A sequence is a run of [`Notification::Value`]s followed by at most one
//! terminal notification. Consumers implement [`Observer`], a single handler
//! that receives every variant.

use tokio::sync::mpsc;

/// One event of a push sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification<T, E> {
    /// A value of the sequence.
    Value(T),
    /// The sequence ended normally.
    Completed,
    /// The sequence ended with an error.
    Failed(E),
}

impl<T, E> Notification<T, E> {
    /// Whether this notification ends the sequence.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Value(_))
    }

    /// The carried value, if this is a value notification.
    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Value(value) => Some(value),
            Self::Completed | Self::Failed(_) => None,
        }
    }
}

/// A terminal signal held back until the queue drains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Terminal<E> {
    Completed,
    Failed(E),
}

impl<E> Terminal<E> {
    pub(crate) fn into_notification<T>(self) -> Notification<T, E> {
        match self {
            Self::Completed => Notification::Completed,
            Self::Failed(err) => Notification::Failed(err),
        }
    }
}

/// Downstream consumer of a push sequence.
///
/// Calls are serialized: an observer never sees two notifications
/// concurrently, and never sees anything after a terminal notification.
pub trait Observer<T, E>: Send + 'static {
    /// Handle the next notification.
    fn on_notification(&mut self, notification: Notification<T, E>);
}

impl<T, E, F> Observer<T, E> for F
where
    F: FnMut(Notification<T, E>) + Send + 'static,
{
    fn on_notification(&mut self, notification: Notification<T, E>) {
        self(notification)
    }
}

impl<T, E> Observer<T, E> for mpsc::UnboundedSender<Notification<T, E>>
where
    T: Send + 'static,
    E: Send + 'static,
{
    fn on_notification(&mut self, notification: Notification<T, E>) {
        // The receiver going away means nobody is listening anymore
        let _ = self.send(notification);
    }
}
