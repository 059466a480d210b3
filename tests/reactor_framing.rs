//! Framing rejection (a record mark whose high bit is clear) and the
//! reactor's liveness guarantee: if `pending()` reports work outstanding
//! and a registered event fires, `poll()` invokes at least one callback.

use std::cell::RefCell;
use std::io::Write;
use std::os::unix::io::AsRawFd;
use std::rc::Rc;
use std::time::Duration;

use xdrpc::reactor::{Op, Reactor};
use xdrpc::socket::{MessageSocket, Recv};

#[test]
fn a_record_mark_with_the_high_bit_clear_closes_the_socket() {
    let mio_listener = mio::net::TcpListener::bind("127.0.0.1:0".parse().unwrap()).unwrap();
    let addr = mio_listener.local_addr().unwrap();

    let writer = std::thread::spawn(move || {
        let mut stream = std::net::TcpStream::connect(addr).unwrap();
        // High bit clear: declares a non-final fragment, which this runtime
        // does not support and must reject rather than wait for more.
        let header = 10u32.to_be_bytes();
        stream.write_all(&header).unwrap();
        stream.write_all(&[0u8; 10]).unwrap();
        // Keep the connection open a moment so the reactor thread has time
        // to read before we tear it down.
        std::thread::sleep(Duration::from_millis(100));
    });

    let mut reactor = Reactor::new().unwrap();
    let handle = reactor.handle();
    let listener_fd = mio_listener.as_raw_fd();

    let events: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
    let socket_slot: Rc<RefCell<Option<MessageSocket>>> = Rc::new(RefCell::new(None));

    let listener = Rc::new(RefCell::new(Some(mio_listener)));
    {
        let listener = listener.clone();
        let handle = handle.clone();
        let events = events.clone();
        let socket_slot = socket_slot.clone();
        reactor
            .fd_cb(listener_fd, Op::Read, move || {
                let mut borrowed = listener.borrow_mut();
                let Some(l) = borrowed.as_mut() else { return };
                if let Ok((stream, _)) = l.accept() {
                    let events = events.clone();
                    let sock = MessageSocket::new(&handle, stream, 0x1000, move |recv| {
                        match recv {
                            Recv::Message(_) => events.borrow_mut().push("message".into()),
                            Recv::Closed => events.borrow_mut().push("closed".into()),
                            Recv::TooLarge => events.borrow_mut().push("toolarge".into()),
                        }
                    })
                    .unwrap();
                    *socket_slot.borrow_mut() = Some(sock);
                }
            })
            .unwrap();
    }

    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while events.borrow().is_empty() && std::time::Instant::now() < deadline {
        reactor.poll(Some(Duration::from_millis(50))).unwrap();
    }

    writer.join().unwrap();
    assert_eq!(*events.borrow(), vec!["closed".to_string()]);
}

#[test]
fn pending_work_eventually_invokes_its_callback() {
    let mut reactor = Reactor::new().unwrap();
    assert!(!reactor.pending(), "a fresh reactor has nothing pending");

    let fired = Rc::new(RefCell::new(false));
    let fired_cb = fired.clone();
    let _timeout = reactor.timeout(5, move || {
        *fired_cb.borrow_mut() = true;
    });

    assert!(reactor.pending(), "a scheduled timer must report pending work");
    reactor.poll(Some(Duration::from_millis(200))).unwrap();
    assert!(*fired.borrow(), "poll() must invoke a fired timer callback");
}
