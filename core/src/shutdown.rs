//! Cooperative cancellation for in-flight catch-up runs.
//!
//! A [`Controller`] is cloned into every component that must be abortable.
//! The pipeline polls [`Controller::ensure_running`] at each RPC boundary and
//! bails out with [`CatchupError::Cancelled`], discarding all partial results;
//! there is no resumable intermediate state.

use std::{
	future::Future,
	pin::Pin,
	sync::{Arc, Mutex},
	task::{Context, Poll, Waker},
};

use crate::types::CatchupError;

#[derive(Clone)]
pub struct Controller<T: Clone> {
	inner: Arc<Mutex<ControllerInner<T>>>,
}

struct ControllerInner<T> {
	reason: Option<T>,
	on_shutdown: Vec<Waker>,
}

impl<T: Clone> Controller<T> {
	pub fn new() -> Self {
		Self {
			inner: Arc::new(Mutex::new(ControllerInner {
				reason: None,
				on_shutdown: Vec::new(),
			})),
		}
	}

	/// Requests shutdown with the given reason. Returns `false` if a shutdown
	/// was already in progress, in which case the first reason wins.
	pub fn trigger_shutdown(&self, reason: T) -> bool {
		let mut inner = self.inner.lock().expect("shutdown lock poisoned");
		if inner.reason.is_some() {
			return false;
		}
		inner.reason = Some(reason);
		for waker in inner.on_shutdown.drain(..) {
			waker.wake();
		}
		true
	}

	pub fn shutdown_reason(&self) -> Option<T> {
		self.inner
			.lock()
			.expect("shutdown lock poisoned")
			.reason
			.clone()
	}

	/// Resolves once a shutdown has been triggered, yielding the reason.
	pub fn triggered_shutdown(&self) -> Triggered<T> {
		Triggered {
			inner: self.inner.clone(),
		}
	}

	/// Runs the future to completion unless a shutdown triggers first, in
	/// which case the shutdown reason is returned instead.
	pub async fn with_cancel<F: Future>(&self, future: F) -> Result<F::Output, T> {
		tokio::select! {
			reason = self.triggered_shutdown() => Err(reason),
			output = future => Ok(output),
		}
	}
}

impl<T: Clone> Default for Controller<T> {
	fn default() -> Self {
		Self::new()
	}
}

impl Controller<String> {
	/// Checked at every RPC boundary of the catch-up pipeline.
	pub fn ensure_running(&self) -> Result<(), CatchupError> {
		match self.shutdown_reason() {
			Some(reason) => Err(CatchupError::Cancelled(reason)),
			None => Ok(()),
		}
	}
}

pub struct Triggered<T> {
	inner: Arc<Mutex<ControllerInner<T>>>,
}

impl<T: Clone> Future for Triggered<T> {
	type Output = T;

	fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		let mut inner = self.inner.lock().expect("shutdown lock poisoned");
		if let Some(reason) = inner.reason.as_ref() {
			return Poll::Ready(reason.clone());
		}

		// always push a fresh waker so we never hold a stale one
		inner.on_shutdown.push(cx.waker().clone());
		Poll::Pending
	}
}
