use std::{cell::RefCell, rc::Rc, thread};

use vigil::{TaskQueue, Tracked, object};

fn main() {
    let queue = TaskQueue::new();

    // A window which closes itself from one of its own callbacks.
    let window = Rc::new(RefCell::new(Some(Tracked::new(Window {
        title: "settings".to_string(),
    }))));
    let weak = window
        .borrow()
        .as_ref()
        .map(Tracked::weak)
        .unwrap_or_default();

    queue.post(&weak, {
        let window = window.clone();
        move || {
            if let Some(closed) = window.borrow_mut().take() {
                println!("closing {}", closed.title);
            }
        }
    });

    queue.post(&weak, || println!("this never prints"));

    // Replies from a worker thread are guarded the same way.
    let poster = queue.poster();
    let reply_target = weak.clone();

    thread::spawn(move || {
        _ = poster.post(reply_target, || println!("this never prints either"));
    })
    .join()
    .unwrap();

    dbg!(queue.run_pending());
    dbg!(queue.run_pending());
    dbg!(&weak);
}

#[derive(Debug)]
pub struct Window {
    title: String,
}

object!(Window);
