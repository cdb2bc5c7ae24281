//! Combinators over collections of promises.

use std::cell::RefCell;
use std::rc::Rc;

use super::combinators::fail_once;
use super::Promise;
use crate::error::Error;

struct Gather<R> {
    slots: Vec<Option<R>>,
    remaining: usize,
}

impl<R> Gather<R> {
    fn new(len: usize) -> Self {
        Self {
            slots: (0..len).map(|_| None).collect(),
            remaining: len,
        }
    }

    /// Fill one slot; returns every slot in order once the last one lands.
    fn fill(&mut self, index: usize, value: R) -> Option<Vec<R>> {
        if self.slots[index].replace(value).is_none() {
            self.remaining -= 1;
        }
        if self.remaining == 0 {
            Some(self.slots.drain(..).flatten().collect())
        } else {
            None
        }
    }
}

impl<T: Clone + 'static> Promise<T> {
    /// Wait for every promise to succeed, collecting values in input order.
    ///
    /// Fails with the first failure to complete. Every input is observed, so
    /// failures after the first are not reported as uncaught. An empty input
    /// succeeds immediately.
    ///
    /// # Example
    ///
    /// ```rust
    /// use beampromise::Promise;
    ///
    /// let (slow, completer) = Promise::pending();
    /// let all = Promise::sequence(vec![slow, Promise::success(2)]);
    /// assert!(!all.is_completed());
    ///
    /// completer.succeed(1).unwrap();
    /// assert_eq!(all.value(), Some(vec![1, 2]));
    /// ```
    pub fn sequence(promises: Vec<Promise<T>>) -> Promise<Vec<T>> {
        if promises.is_empty() {
            return Promise::success(Vec::new());
        }
        let (all, completer) = Promise::pending();
        let completer = Rc::new(completer);
        let gather = Rc::new(RefCell::new(Gather::new(promises.len())));

        for (index, promise) in promises.iter().enumerate() {
            let completer = Rc::clone(&completer);
            let gather = Rc::clone(&gather);
            promise.on_complete(move |result| match result {
                Ok(value) => {
                    let done = gather.borrow_mut().fill(index, value.clone());
                    if let Some(values) = done {
                        if !completer.is_completed() {
                            let _ = completer.succeed(values);
                        }
                    }
                }
                Err(error) => fail_once(&completer, error),
            });
        }
        all
    }

    /// Wait for every promise to succeed, discarding the values.
    pub fn all(promises: Vec<Promise<T>>) -> Promise<()> {
        Self::sequence(promises).to_unit()
    }

    /// Wait for every promise to complete, collecting each outcome.
    ///
    /// The returned promise never fails and all input failures count as
    /// observed.
    pub fn sequence_settled(promises: Vec<Promise<T>>) -> Promise<Vec<Result<T, Error>>> {
        if promises.is_empty() {
            return Promise::success(Vec::new());
        }
        let (settled, completer) = Promise::pending();
        let gather = Rc::new(RefCell::new(Gather::new(promises.len())));
        let completer = Rc::new(completer);

        for (index, promise) in promises.iter().enumerate() {
            let completer = Rc::clone(&completer);
            let gather = Rc::clone(&gather);
            promise.on_complete(move |result| {
                let done = gather.borrow_mut().fill(index, result.clone());
                if let Some(outcomes) = done {
                    let _ = completer.succeed(outcomes);
                }
            });
        }
        settled
    }
}
