//! `AsyncRequest<Req, Resp>`: the boundary type a non-realtime caller uses to
//! enqueue work for a realtime thread and (optionally) be notified of its
//! result via a [`RealtimePromise`].

use crate::error::RtStatus;
use crate::future::RealtimePromise;

/// A request value paired with an optional [`RealtimePromise`] for its
/// response. Movable, not clonable.
pub struct AsyncRequest<Req, Resp> {
    request: Req,
    promise: Option<RealtimePromise<Resp>>,
}

impl<Req, Resp> AsyncRequest<Req, Resp> {
    /// A request with no promise: the realtime side runs it but nobody is
    /// waiting on a reply.
    pub fn fire_and_forget(request: Req) -> Self {
        Self {
            request,
            promise: None,
        }
    }

    /// A request paired with the promise its response should be posted to.
    pub fn new(request: Req, promise: RealtimePromise<Resp>) -> Self {
        Self {
            request,
            promise: Some(promise),
        }
    }

    /// Borrow the request value.
    pub fn get_request(&self) -> &Req {
        &self.request
    }

    /// Take the request value by move. Further calls to [`get_request`](Self::get_request)
    /// observe whatever `Default` (or unspecified state) is left behind by
    /// the caller; prefer this only when `Req` is expensive to copy and is
    /// not needed again after this call.
    pub fn get_moved_request(self) -> (Req, Option<RealtimePromise<Resp>>) {
        (self.request, self.promise)
    }

    /// Whether the promise (or its future) has been cancelled up until now.
    /// `false` if this request carries no promise.
    pub fn is_cancelled(&self) -> bool {
        match self.promise.as_ref() {
            Some(promise) => promise.is_cancelled(),
            None => false,
        }
    }

    /// Post `value` as the response, if this request carries a promise.
    /// Returns OK with no effect if it does not.
    pub fn set_response(&mut self, value: Resp) -> RtStatus {
        match self.promise.as_mut() {
            Some(promise) => promise.set_value(value),
            None => RtStatus::ok(),
        }
    }

    /// Cancel the associated promise, if any. Returns OK with no effect if
    /// this request carries no promise.
    pub fn cancel(&self) -> RtStatus {
        match self.promise.as_ref() {
            Some(promise) => promise.cancel(),
            None => RtStatus::ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Duration;
    use crate::future::NonRealtimeFuture;

    #[test]
    fn fire_and_forget_set_response_is_a_no_op_ok() {
        let mut req: AsyncRequest<u32, u32> = AsyncRequest::fire_and_forget(7);
        assert_eq!(*req.get_request(), 7);
        assert!(req.set_response(1).is_ok());
        assert!(req.cancel().is_ok());
    }

    #[test]
    fn request_with_promise_delivers_response_through_future() {
        let future = NonRealtimeFuture::<u32>::new();
        let promise = future.get_promise().unwrap();
        let mut req = AsyncRequest::new(99, promise);

        assert_eq!(*req.get_request(), 99);
        assert!(req.set_response(123).is_ok());

        let value = future.get_with_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(value, 123);
    }

    #[test]
    fn is_cancelled_reflects_future_cancellation() {
        let future =
            NonRealtimeFuture::<u32>::with_cancellation_confirm_timeout(Duration::from_millis(
                20,
            ));
        let promise = future.get_promise().unwrap();
        let req = AsyncRequest::new(1, promise);
        assert!(!req.is_cancelled());
        // Nothing acknowledges the cancellation (the promise is held inside
        // `req` and never has `cancel`/`set_response` called on it), so the
        // wait for the ack times out. The shared `is_cancelled` flag flips
        // synchronously before that wait begins, independent of its outcome.
        let status = future.cancel();
        assert!(matches!(
            status.code(),
            crate::error::ErrorKind::DeadlineExceeded
        ));
        assert!(req.is_cancelled());
    }

    #[test]
    fn get_moved_request_returns_request_and_promise() {
        let future = NonRealtimeFuture::<u32>::new();
        let promise = future.get_promise().unwrap();
        let req = AsyncRequest::new(5, promise);
        let (request, promise) = req.get_moved_request();
        assert_eq!(request, 5);
        assert!(promise.is_some());
    }
}
