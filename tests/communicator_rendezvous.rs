//! Communicator rendezvous suite.
//!
//! Exactly-once handoff between speakers and listeners: words pair up one to
//! one, neither side returns without a partner, and a speaker never finishes
//! before the listener that took its word.
//!
//! Run with: `cargo test --test communicator_rendezvous`

mod common {
    pub fn init_test_logging() {
        // Initialize tracing for tests if not already done
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_test_writer()
            .try_init();
    }
}

use coopkern::config::{KernelConfig, PolicyChoice};
use coopkern::runtime::Kernel;
use coopkern::sync::Communicator;
use coopkern::{assert_with_log, test_complete, test_phase};
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

fn init_test(name: &str) {
    common::init_test_logging();
    test_phase!(name);
}

#[test]
fn one_pair_exchanges_exactly_the_spoken_word() {
    init_test("one_pair_exchanges_exactly_the_spoken_word");
    let mut kernel = Kernel::new(KernelConfig::new(1));
    let comm = Rc::new(Communicator::new(&kernel.handle()));
    let received: Rc<RefCell<Option<i32>>> = Rc::new(RefCell::new(None));

    let speaker = Rc::clone(&comm);
    kernel.spawn("speaker", async move {
        speaker.speak(5).await;
    });
    let listener = Rc::clone(&comm);
    let out = Rc::clone(&received);
    kernel.spawn("listener", async move {
        *out.borrow_mut() = Some(listener.listen().await);
    });

    kernel.run_until_quiescent().expect("no step limit");
    assert_with_log!(
        *received.borrow() == Some(5),
        "listener received the spoken word",
        Some(5),
        *received.borrow()
    );
    assert_eq!(kernel.alive_threads(), 0);
    test_complete!("one_pair_exchanges_exactly_the_spoken_word");
}

#[test]
fn speaker_blocks_until_a_listener_arrives() {
    init_test("speaker_blocks_until_a_listener_arrives");
    let mut kernel = Kernel::new(KernelConfig::new(1));
    let comm = Rc::new(Communicator::new(&kernel.handle()));

    let speaker = Rc::clone(&comm);
    kernel.spawn("speaker", async move {
        speaker.speak(9).await;
    });

    kernel.run_until_quiescent().expect("no step limit");
    assert_eq!(kernel.alive_threads(), 1, "speaker waits for a partner");

    // A listener arriving later completes the rendezvous.
    let listener = Rc::clone(&comm);
    kernel.spawn("listener", async move {
        assert_eq!(listener.listen().await, 9);
    });
    kernel.run_until_quiescent().expect("no step limit");
    assert_eq!(kernel.alive_threads(), 0);
    test_complete!("speaker_blocks_until_a_listener_arrives");
}

#[test]
fn listener_blocks_until_a_speaker_arrives() {
    init_test("listener_blocks_until_a_speaker_arrives");
    let mut kernel = Kernel::new(KernelConfig::new(1));
    let comm = Rc::new(Communicator::new(&kernel.handle()));

    let listener = Rc::clone(&comm);
    kernel.spawn("listener", async move {
        let _ = listener.listen().await;
    });

    kernel.run_until_quiescent().expect("no step limit");
    assert_eq!(kernel.alive_threads(), 1, "listener waits for a partner");

    let speaker = Rc::clone(&comm);
    kernel.spawn("speaker", async move {
        speaker.speak(3).await;
    });
    kernel.run_until_quiescent().expect("no step limit");
    assert_eq!(kernel.alive_threads(), 0);
    test_complete!("listener_blocks_until_a_speaker_arrives");
}

#[test]
fn distinct_words_form_a_bijection() {
    init_test("distinct_words_form_a_bijection");
    const PAIRS: i32 = 8;
    let mut kernel = Kernel::new(KernelConfig::new(1));
    let comm = Rc::new(Communicator::new(&kernel.handle()));
    let received: Rc<RefCell<Vec<i32>>> = Rc::new(RefCell::new(Vec::new()));

    for word in 0..PAIRS {
        let speaker = Rc::clone(&comm);
        kernel.spawn(&format!("speaker{word}"), async move {
            speaker.speak(word).await;
        });
    }
    for i in 0..PAIRS {
        let listener = Rc::clone(&comm);
        let out = Rc::clone(&received);
        kernel.spawn(&format!("listener{i}"), async move {
            out.borrow_mut().push(listener.listen().await);
        });
    }

    kernel.run_until_quiescent().expect("no step limit");
    assert_eq!(kernel.alive_threads(), 0, "every pair completed");

    let words = received.borrow();
    let unique: HashSet<i32> = words.iter().copied().collect();
    assert_eq!(words.len(), PAIRS as usize, "every listener got a word");
    assert_eq!(unique.len(), PAIRS as usize, "no word was delivered twice");
    for word in 0..PAIRS {
        assert!(unique.contains(&word), "word {word} was dropped");
    }
    test_complete!("distinct_words_form_a_bijection");
}

#[test]
fn speaker_finishes_only_after_its_listener_took_the_word() {
    init_test("speaker_finishes_only_after_its_listener_took_the_word");
    const PAIRS: i32 = 6;
    let mut kernel = Kernel::new(KernelConfig::new(1));
    let comm = Rc::new(Communicator::new(&kernel.handle()));
    let events: Rc<RefCell<Vec<(char, i32)>>> = Rc::new(RefCell::new(Vec::new()));

    // Interleave spawn order so speakers and listeners arrive mixed.
    for i in 0..PAIRS {
        let speaker = Rc::clone(&comm);
        let log = Rc::clone(&events);
        kernel.spawn(&format!("speaker{i}"), async move {
            speaker.speak(i).await;
            log.borrow_mut().push(('s', i));
        });
        let listener = Rc::clone(&comm);
        let log = Rc::clone(&events);
        kernel.spawn(&format!("listener{i}"), async move {
            let word = listener.listen().await;
            log.borrow_mut().push(('l', word));
        });
    }

    kernel.run_until_quiescent().expect("no step limit");
    assert_eq!(kernel.alive_threads(), 0);

    let events = events.borrow();
    assert_eq!(events.len(), (PAIRS * 2) as usize);
    for word in 0..PAIRS {
        let spoke = events
            .iter()
            .position(|&e| e == ('s', word))
            .expect("speaker completed");
        let heard = events
            .iter()
            .position(|&e| e == ('l', word))
            .expect("listener completed");
        assert!(
            heard < spoke,
            "speaker of word {word} finished before its listener"
        );
    }
    test_complete!("speaker_finishes_only_after_its_listener_took_the_word");
}

#[test]
fn rendezvous_works_under_the_lottery_policy_too() {
    init_test("rendezvous_works_under_the_lottery_policy_too");
    const PAIRS: i32 = 5;
    let mut kernel = Kernel::new(KernelConfig::new(99).policy(PolicyChoice::Lottery));
    let comm = Rc::new(Communicator::new(&kernel.handle()));
    let received: Rc<RefCell<Vec<i32>>> = Rc::new(RefCell::new(Vec::new()));

    for word in 0..PAIRS {
        let speaker = Rc::clone(&comm);
        kernel.spawn(&format!("speaker{word}"), async move {
            speaker.speak(word).await;
        });
        let listener = Rc::clone(&comm);
        let out = Rc::clone(&received);
        kernel.spawn(&format!("listener{word}"), async move {
            out.borrow_mut().push(listener.listen().await);
        });
    }

    kernel.run_until_quiescent().expect("no step limit");
    assert_eq!(kernel.alive_threads(), 0);

    let words = received.borrow();
    let unique: HashSet<i32> = words.iter().copied().collect();
    assert_eq!(unique.len(), PAIRS as usize);
    test_complete!("rendezvous_works_under_the_lottery_policy_too");
}
