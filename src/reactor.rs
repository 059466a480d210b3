//! Single-threaded cooperative event reactor: fd readiness callbacks,
//! millisecond timers, a thread-safe callback injection queue, a process
//! background-thread helper (`async`), and process-wide signal callbacks.
//!
//! Grounded on `include/xdrc/pollset.h`. Built on `mio` for cross-platform
//! readiness polling instead of a raw `poll(2)` loop, and on `signal-hook`'s
//! async-signal-safe low-level registration for the signal table —
//! `mio::Waker` already *is* the self-pipe trick the source hand-rolled (a
//! dedicated eventfd/pipe registered with the poller), so a signal handler
//! only needs to flip an atomic flag and poke the waker; no
//! `signal-hook-mio` event source or separate pipe pair is needed here.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};

use crate::error::{Error, Result};

const WAKE_TOKEN: Token = Token(usize::MAX);

/// Interest a caller registers on a file descriptor.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Op {
    Read,
    Write,
    ReadWrite,
    ReadOnce,
    WriteOnce,
}

type Cb = Box<dyn FnMut() + 'static>;

struct FdState {
    read: Option<Cb>,
    write: Option<Cb>,
    read_once: bool,
    write_once: bool,
}

impl FdState {
    fn interest(&self) -> Option<Interest> {
        match (self.read.is_some(), self.write.is_some()) {
            (true, true) => Some(Interest::READABLE | Interest::WRITABLE),
            (true, false) => Some(Interest::READABLE),
            (false, true) => Some(Interest::WRITABLE),
            (false, false) => None,
        }
    }
}

struct SignalGlobal {
    flags: Vec<AtomicBool>,
    wakers: Mutex<Vec<Option<Arc<mio::Waker>>>>,
    registered: Mutex<Vec<bool>>,
}

fn signal_global() -> &'static SignalGlobal {
    static CELL: OnceLock<SignalGlobal> = OnceLock::new();
    CELL.get_or_init(|| SignalGlobal {
        flags: (0..32).map(|_| AtomicBool::new(false)).collect(),
        wakers: Mutex::new(vec![None; 32]),
        registered: Mutex::new(vec![false; 32]),
    })
}

fn epoch() -> Instant {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    *EPOCH.get_or_init(Instant::now)
}

/// Milliseconds since an arbitrary but fixed point in this process's
/// lifetime, the basis for all timer deadlines.
pub fn now_ms() -> i64 {
    epoch().elapsed().as_millis() as i64
}

/// A handle to a pending timeout, returned by [`Reactor::timeout`].
/// Invalidated once the timer fires; cancelling a fired `Timeout` is a
/// caller bug but harmless (it is simply not found).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Timeout {
    deadline: i64,
    seq: u64,
}

/// A registration change queued from inside a callback, applied at the top
/// of the next `poll()` iteration rather than immediately. A callback
/// running during `poll` cannot safely call back into `&mut Reactor` (it
/// would alias the borrow `poll` already holds), so anything that needs to
/// change its own fd interest while reacting to an event — a message
/// socket draining its write queue, say — goes through a [`ReactorHandle`]
/// instead, which just appends to this queue and pokes the self-pipe
/// waker. Per §5, a callback registered this way "may or may not fire in
/// the same iteration... no later than the next" — applying deferred ops
/// at the top of `poll` satisfies that bound directly.
enum PendingOp {
    Register(RawFd, Op, Cb),
    Remove(RawFd, Op),
}

/// A cheap, cloneable handle that can register/remove fd callbacks from
/// inside a callback body, deferring the actual change to the next `poll`
/// iteration. See [`PendingOp`].
#[derive(Clone)]
pub struct ReactorHandle {
    pending: Arc<Mutex<VecDeque<PendingOp>>>,
    waker: Arc<mio::Waker>,
}

impl ReactorHandle {
    pub fn fd_cb(&self, fd: RawFd, op: Op, cb: impl FnMut() + 'static) {
        self.pending.lock().unwrap().push_back(PendingOp::Register(fd, op, Box::new(cb)));
        let _ = self.waker.wake();
    }

    pub fn remove_cb(&self, fd: RawFd, op: Op) {
        self.pending.lock().unwrap().push_back(PendingOp::Remove(fd, op));
        let _ = self.waker.wake();
    }
}

// `Cb` (`Box<dyn FnMut()>`) is not `Send`, yet `PendingOp` sits behind a
// `Mutex` shared with `ReactorHandle` so sockets can reach it from their own
// callback closures. This is sound because the reactor is single-threaded:
// a `PendingOp` is only ever constructed and drained on the reactor thread,
// the `Mutex` here guards against nothing but re-entrant access from within
// that same thread, not cross-thread handoff (unlike `async_cbs`, which
// genuinely crosses threads and whose callbacks are `Send`).
unsafe impl Send for PendingOp {}

pub struct Reactor {
    poll: Poll,
    events: Events,
    fds: HashMap<RawFd, FdState>,
    timers: BTreeMap<(i64, u64), Cb>,
    next_seq: u64,
    async_cbs: Arc<Mutex<Vec<Box<dyn FnOnce() + Send + 'static>>>>,
    waker: Arc<mio::Waker>,
    nasync: Arc<Mutex<usize>>,
    signal_cbs: HashMap<i32, Cb>,
    pending: Arc<Mutex<VecDeque<PendingOp>>>,
}

impl Reactor {
    pub fn new() -> Result<Self> {
        let poll = Poll::new().map_err(|e| Error::system("mio::Poll::new", e))?;
        let waker = Arc::new(
            mio::Waker::new(poll.registry(), WAKE_TOKEN)
                .map_err(|e| Error::system("mio::Waker::new", e))?,
        );
        Ok(Reactor {
            poll,
            events: Events::with_capacity(256),
            fds: HashMap::new(),
            timers: BTreeMap::new(),
            next_seq: 0,
            async_cbs: Arc::new(Mutex::new(Vec::new())),
            waker,
            nasync: Arc::new(Mutex::new(0)),
            signal_cbs: HashMap::new(),
            pending: Arc::new(Mutex::new(VecDeque::new())),
        })
    }

    /// A cloneable handle other components (message sockets, listeners)
    /// can hold onto and use to change fd registrations from inside a
    /// callback, without needing `&mut Reactor`.
    pub fn handle(&self) -> ReactorHandle {
        ReactorHandle { pending: self.pending.clone(), waker: self.waker.clone() }
    }

    /// Returns `false` if nothing would ever wake this reactor on its
    /// own: no fd callbacks, no timers, no asyncs in flight, and no
    /// injected callbacks waiting. A caller seeing `false` must not call
    /// `poll` with an infinite timeout unless another thread is expected
    /// to call `inject_cb` or a registered signal is expected to fire.
    pub fn pending(&self) -> bool {
        !self.fds.is_empty()
            || !self.timers.is_empty()
            || !self.signal_cbs.is_empty()
            || *self.nasync.lock().unwrap() > 0
            || !self.async_cbs.lock().unwrap().is_empty()
    }

    /// Safe to call from another thread (it just pushes a waker event).
    pub fn wake(&self) {
        let _ = self.waker.wake();
    }

    pub fn fd_cb(&mut self, fd: RawFd, op: Op, cb: impl FnMut() + 'static) -> Result<()> {
        let entry = self.fds.entry(fd).or_insert_with(|| FdState {
            read: None,
            write: None,
            read_once: false,
            write_once: false,
        });
        let was_registered = entry.interest().is_some();
        match op {
            Op::Read => {
                entry.read = Some(Box::new(cb));
                entry.read_once = false;
            }
            Op::ReadOnce => {
                entry.read = Some(Box::new(cb));
                entry.read_once = true;
            }
            Op::Write => {
                entry.write = Some(Box::new(cb));
                entry.write_once = false;
            }
            Op::WriteOnce => {
                entry.write = Some(Box::new(cb));
                entry.write_once = true;
            }
            Op::ReadWrite => {
                return Err(Error::InvariantFailed(
                    "ReadWrite is only valid when removing callbacks".into(),
                ))
            }
        }
        self.sync_registration(fd, was_registered)
    }

    /// Removes a callback. `Op::ReadWrite` removes both.
    pub fn remove_cb(&mut self, fd: RawFd, op: Op) -> Result<()> {
        let was_registered = self.fds.get(&fd).map(|s| s.interest().is_some()).unwrap_or(false);
        if let Some(state) = self.fds.get_mut(&fd) {
            match op {
                Op::Read | Op::ReadOnce => state.read = None,
                Op::Write | Op::WriteOnce => state.write = None,
                Op::ReadWrite => {
                    state.read = None;
                    state.write = None;
                }
            }
        }
        self.sync_registration(fd, was_registered)
    }

    fn sync_registration(&mut self, fd: RawFd, was_registered: bool) -> Result<()> {
        let still_wanted = self.fds.get(&fd).and_then(|s| s.interest());
        let token = Token(fd as usize);
        match (was_registered, still_wanted) {
            (false, Some(interest)) => self
                .poll
                .registry()
                .register(&mut SourceFd(&fd), token, interest)
                .map_err(|e| Error::system("mio register", e)),
            (true, Some(interest)) => self
                .poll
                .registry()
                .reregister(&mut SourceFd(&fd), token, interest)
                .map_err(|e| Error::system("mio reregister", e)),
            (true, None) => {
                self.fds.remove(&fd);
                self.poll
                    .registry()
                    .deregister(&mut SourceFd(&fd))
                    .map_err(|e| Error::system("mio deregister", e))
            }
            (false, None) => Ok(()),
        }
    }

    /// Thread-safe: pushes `cb` onto the pending queue and wakes the
    /// reactor. Do not call from the reactor's own thread for anything
    /// that must run immediately — it will only run on the next `poll`.
    pub fn inject_cb(&self, cb: impl FnOnce() + Send + 'static) {
        let mut guard = self.async_cbs.lock().unwrap();
        guard.push(Box::new(cb));
        drop(guard);
        self.wake();
    }

    /// Runs `work` on a detached OS thread, then injects `cb` with the
    /// result back onto this reactor once `work` completes.
    pub fn spawn_async<R, W, C>(&self, work: W, cb: C)
    where
        R: Send + 'static,
        W: FnOnce() -> R + Send + 'static,
        C: FnOnce(R) + 'static,
    {
        let async_cbs = self.async_cbs.clone();
        let waker = self.waker.clone();
        let nasync = self.nasync.clone();
        *nasync.lock().unwrap() += 1;
        std::thread::spawn(move || {
            let result = work();
            let nasync2 = nasync.clone();
            // `cb` runs back on the reactor thread via the injected queue,
            // so it need not be Send; only the boxed closure crossing the
            // thread boundary here (which just moves `result` and calls a
            // thread-local trampoline) needs to be.
            let trampoline: Box<dyn FnOnce() + Send> = Box::new(move || {
                *nasync2.lock().unwrap() -= 1;
            });
            async_cbs.lock().unwrap().push(Box::new(move || {
                trampoline();
                cb(result);
            }));
            let _ = waker.wake();
        });
    }

    pub fn timeout(&mut self, ms: i64, cb: impl FnMut() + 'static) -> Timeout {
        self.timeout_at(now_ms() + ms, cb)
    }

    pub fn timeout_at(&mut self, deadline_ms: i64, cb: impl FnMut() + 'static) -> Timeout {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.timers.insert((deadline_ms, seq), Box::new(cb));
        Timeout { deadline: deadline_ms, seq }
    }

    pub fn timeout_cancel(&mut self, t: Timeout) {
        self.timers.remove(&(t.deadline, t.seq));
    }

    pub fn timeout_reschedule(&mut self, t: Timeout, new_deadline_ms: i64) -> Option<Timeout> {
        let cb = self.timers.remove(&(t.deadline, t.seq))?;
        let seq = self.next_seq;
        self.next_seq += 1;
        self.timers.insert((new_deadline_ms, seq), cb);
        Some(Timeout { deadline: new_deadline_ms, seq })
    }

    /// Registers a process-wide signal callback. Only one callback may be
    /// active for a given signal across every `Reactor` in the process;
    /// registering again "steals" the signal from whichever reactor
    /// previously owned it, atomically, so no signal ever goes uncaught
    /// mid-transfer.
    pub fn signal_cb(&mut self, sig: i32, cb: impl FnMut() + 'static) -> Result<()> {
        let idx = sig as usize;
        if idx >= 32 {
            return Err(Error::InvariantFailed(format!("signal {sig} out of range")));
        }
        let g = signal_global();
        {
            let mut registered = g.registered.lock().unwrap();
            if !registered[idx] {
                unsafe {
                    signal_hook::low_level::register(sig, move || {
                        g.flags[idx].store(true, Ordering::SeqCst);
                        if let Some(w) = g.wakers.lock().unwrap()[idx].as_ref() {
                            let _ = w.wake();
                        }
                    })
                    .map_err(|e| Error::system("signal_hook::register", e))?;
                }
                registered[idx] = true;
            }
        }
        g.wakers.lock().unwrap()[idx] = Some(self.waker.clone());
        self.signal_cbs.insert(sig, Box::new(cb));
        Ok(())
    }

    pub fn signal_cb_remove(&mut self, sig: i32) {
        self.signal_cbs.remove(&sig);
    }

    fn apply_pending(&mut self) -> Result<()> {
        let ops: Vec<PendingOp> = std::mem::take(&mut *self.pending.lock().unwrap()).into_iter().collect();
        for op in ops {
            match op {
                PendingOp::Register(fd, op, cb) => {
                    let was_registered = self.fds.get(&fd).and_then(|s| s.interest()).is_some();
                    let entry = self.fds.entry(fd).or_insert_with(|| FdState {
                        read: None,
                        write: None,
                        read_once: false,
                        write_once: false,
                    });
                    match op {
                        Op::Read => {
                            entry.read = Some(cb);
                            entry.read_once = false;
                        }
                        Op::ReadOnce => {
                            entry.read = Some(cb);
                            entry.read_once = true;
                        }
                        Op::Write => {
                            entry.write = Some(cb);
                            entry.write_once = false;
                        }
                        Op::WriteOnce => {
                            entry.write = Some(cb);
                            entry.write_once = true;
                        }
                        Op::ReadWrite => {}
                    }
                    self.sync_registration(fd, was_registered)?;
                }
                PendingOp::Remove(fd, op) => {
                    self.remove_cb(fd, op)?;
                }
            }
        }
        Ok(())
    }

    fn run_due_timers(&mut self) {
        loop {
            let next_key = match self.timers.keys().next().copied() {
                Some(k) if k.0 <= now_ms() => k,
                _ => break,
            };
            if let Some(mut cb) = self.timers.remove(&next_key) {
                cb();
            }
        }
    }

    fn run_signal_handlers(&mut self) {
        let g = signal_global();
        for (&sig, cb) in self.signal_cbs.iter_mut() {
            let idx = sig as usize;
            if g.flags[idx].swap(false, Ordering::SeqCst) {
                cb();
            }
        }
    }

    fn run_injected(&mut self) {
        let pending: Vec<_> = std::mem::take(&mut *self.async_cbs.lock().unwrap());
        for cb in pending {
            cb();
        }
    }

    /// One round of checking every registered condition. `timeout` bounds
    /// how long to block when nothing is immediately ready; `None` blocks
    /// until the next timer or event.
    pub fn poll(&mut self, timeout: Option<Duration>) -> Result<()> {
        self.apply_pending()?;

        let poll_timeout = match (self.timers.keys().next().copied(), timeout) {
            (Some((deadline, _)), user) => {
                let until_timer = Duration::from_millis((deadline - now_ms()).max(0) as u64);
                Some(match user {
                    Some(u) => until_timer.min(u),
                    None => until_timer,
                })
            }
            (None, user) => user,
        };
        self.poll
            .poll(&mut self.events, poll_timeout)
            .map_err(|e| Error::system("mio::Poll::poll", e))?;

        let mut to_remove_read = Vec::new();
        let mut to_remove_write = Vec::new();
        for event in self.events.iter() {
            if event.token() == WAKE_TOKEN {
                continue;
            }
            let fd = event.token().0 as RawFd;
            if event.is_readable() {
                if let Some(state) = self.fds.get_mut(&fd) {
                    if let Some(cb) = state.read.as_mut() {
                        cb();
                    }
                    if state.read_once {
                        to_remove_read.push(fd);
                    }
                }
            }
            if event.is_writable() {
                if let Some(state) = self.fds.get_mut(&fd) {
                    if let Some(cb) = state.write.as_mut() {
                        cb();
                    }
                    if state.write_once {
                        to_remove_write.push(fd);
                    }
                }
            }
        }
        for fd in to_remove_read {
            self.remove_cb(fd, Op::Read)?;
        }
        for fd in to_remove_write {
            self.remove_cb(fd, Op::Write)?;
        }

        self.run_due_timers();
        self.run_signal_handlers();
        self.run_injected();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn timers_fire_in_deadline_then_insertion_order() {
        let mut r = Reactor::new().unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));
        let now = now_ms();
        let o1 = order.clone();
        r.timeout_at(now, move || o1.lock().unwrap().push(1));
        let o2 = order.clone();
        r.timeout_at(now, move || o2.lock().unwrap().push(2));
        r.poll(Some(Duration::from_millis(10))).unwrap();
        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn pending_reflects_registered_work() {
        let r = Reactor::new().unwrap();
        assert!(!r.pending());
    }

    #[test]
    fn pending_reflects_a_registered_signal_callback() {
        let mut r = Reactor::new().unwrap();
        assert!(!r.pending());
        r.signal_cb(signal_hook::consts::SIGUSR1, || {}).unwrap();
        assert!(r.pending());
        r.signal_cb_remove(signal_hook::consts::SIGUSR1);
        assert!(!r.pending());
    }

    #[test]
    fn inject_cb_runs_on_next_poll() {
        let mut r = Reactor::new().unwrap();
        let ran = Arc::new(AtomicUsize::new(0));
        let ran2 = ran.clone();
        r.inject_cb(move || {
            ran2.fetch_add(1, Ordering::SeqCst);
        });
        r.poll(Some(Duration::from_millis(50))).unwrap();
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }
}
