use atmega328p_firmware::hal::irq::IrqPolicy;
use atmega328p_firmware::hal::sim::SimBus;
use atmega328p_firmware::hal::timer::unit::{OCIEA, TOIE};
use atmega328p_firmware::hal::timer::{
    Channel, ClockSource, DispatchStats, EventKind, EventQueue, OutputAction, TimerCallbacks, TimerConfig,
    TimerEvent, TimerId, TimerManager, TimerMode, TimerState,
};

#[derive(Default)]
struct Recorder {
    elapsed: Vec<TimerId>,
    matches: Vec<(TimerId, Channel)>,
}

impl TimerCallbacks for Recorder {
    fn period_elapsed(&mut self, timer: TimerId) {
        self.elapsed.push(timer);
    }

    fn compare_match(&mut self, timer: TimerId, channel: Channel) {
        self.matches.push((timer, channel));
    }
}

fn manager() -> TimerManager<SimBus> {
    TimerManager::new(SimBus::new(), IrqPolicy::Masked)
}

fn overflow(timer: TimerId) -> TimerEvent {
    TimerEvent::new(timer, EventKind::Overflow)
}

#[test]
fn autoreload_delivers_every_overflow() {
    let mut timers = manager();
    let handle = timers
        .initialize(TimerConfig {
            timer: TimerId::Timer1,
            clock: ClockSource::Div8,
            mode: TimerMode::Autoreload,
            preset: 0,
        })
        .unwrap();
    timers.start_with_interrupt(&handle);
    let mut recorder = Recorder::default();

    for _ in 0..1000 {
        assert!(timers.dispatch(overflow(TimerId::Timer1), &mut recorder));
        assert!(timers.is_counting(TimerId::Timer1));
    }

    assert_eq!(recorder.elapsed.len(), 1000);
    assert_eq!(timers.recorded_state(&handle), TimerState::Busy);
    assert_eq!(
        timers.stats(),
        DispatchStats {
            delivered: 1000,
            spurious: 0
        }
    );
}

#[test]
fn one_shot_delivers_once_then_stops() {
    let mut timers = manager();
    let unit = TimerId::Timer2.unit();
    let handle = timers
        .initialize(TimerConfig {
            timer: TimerId::Timer2,
            clock: ClockSource::Div128,
            mode: TimerMode::OneShot,
            preset: 0x80,
        })
        .unwrap();
    timers.start_with_interrupt(&handle);
    let mut recorder = Recorder::default();

    assert!(timers.dispatch(overflow(TimerId::Timer2), &mut recorder));
    assert!(!timers.is_counting(TimerId::Timer2));
    assert_eq!(timers.bus().peek(unit.timsk) & TOIE, 0);
    assert_eq!(timers.recorded_state(&handle), TimerState::Ready);

    // A late overflow for the stopped unit is not delivered
    assert!(!timers.dispatch(overflow(TimerId::Timer2), &mut recorder));
    assert_eq!(recorder.elapsed, vec![TimerId::Timer2]);
    assert_eq!(timers.stats().spurious, 1);
}

#[test]
fn compare_match_goes_to_configured_channel_only() {
    let mut timers = manager();
    let handle = timers
        .ctc_initialize(TimerConfig {
            timer: TimerId::Timer0,
            clock: ClockSource::Div64,
            mode: TimerMode::Ctc {
                channel: Channel::A,
                output: OutputAction::None,
            },
            preset: 249,
        })
        .unwrap();
    timers.ctc_start_with_interrupt(&handle);
    let mut recorder = Recorder::default();

    assert!(timers.dispatch(TimerEvent::new(TimerId::Timer0, EventKind::CompareA), &mut recorder));
    assert!(!timers.dispatch(TimerEvent::new(TimerId::Timer0, EventKind::CompareB), &mut recorder));
    assert!(!timers.dispatch(overflow(TimerId::Timer0), &mut recorder));

    assert_eq!(recorder.matches, vec![(TimerId::Timer0, Channel::A)]);
    assert!(recorder.elapsed.is_empty());
    assert_eq!(timers.recorded_state(&handle), TimerState::Busy);
    assert_eq!(timers.bus().peek(TimerId::Timer0.unit().timsk), OCIEA);
    assert_eq!(timers.stats().spurious, 2);
}

#[test]
fn events_for_unowned_or_idle_units_are_spurious() {
    let mut timers = manager();
    let mut recorder = Recorder::default();

    assert!(!timers.dispatch(overflow(TimerId::Timer0), &mut recorder));

    let handle = timers
        .initialize(TimerConfig {
            timer: TimerId::Timer0,
            clock: ClockSource::Div64,
            mode: TimerMode::Autoreload,
            preset: 0,
        })
        .unwrap();
    // Owned but never started
    assert!(!timers.dispatch(overflow(TimerId::Timer0), &mut recorder));

    timers.start(&handle);
    timers.deinitialize(handle);
    assert!(!timers.dispatch(overflow(TimerId::Timer0), &mut recorder));

    assert!(recorder.elapsed.is_empty());
    assert_eq!(timers.stats().spurious, 3);
}

#[test]
fn queue_keeps_order_and_counts_overflow() {
    static QUEUE: EventQueue = EventQueue::new();
    for i in 0..20 {
        let kind = if i % 2 == 0 { EventKind::CompareA } else { EventKind::Overflow };
        QUEUE.post(TimerEvent::new(TimerId::Timer0, kind));
    }
    assert_eq!(QUEUE.dropped(), 4);

    let mut timers = TimerManager::with_queue(SimBus::new(), IrqPolicy::Masked, &QUEUE);
    let handle = timers
        .ctc_initialize(TimerConfig {
            timer: TimerId::Timer0,
            clock: ClockSource::Div64,
            mode: TimerMode::Ctc {
                channel: Channel::A,
                output: OutputAction::None,
            },
            preset: 249,
        })
        .unwrap();
    timers.ctc_start(&handle);
    let mut recorder = Recorder::default();

    assert_eq!(timers.dispatch_pending(&mut recorder), 16);
    assert!(QUEUE.is_empty());
    assert_eq!(recorder.matches.len(), 8);
    assert_eq!(
        timers.stats(),
        DispatchStats {
            delivered: 8,
            spurious: 8
        }
    );
}

#[test]
fn unit_callbacks_do_nothing() {
    let mut timers = manager();
    let handle = timers
        .initialize(TimerConfig {
            timer: TimerId::Timer2,
            clock: ClockSource::Div1,
            mode: TimerMode::Autoreload,
            preset: 0,
        })
        .unwrap();
    timers.start(&handle);

    assert!(timers.dispatch(overflow(TimerId::Timer2), &mut ()));
    assert_eq!(timers.stats().delivered, 1);
}

fn tick_config(timer: TimerId) -> TimerConfig {
    TimerConfig {
        timer,
        clock: ClockSource::Div64,
        mode: TimerMode::Ctc {
            channel: Channel::A,
            output: OutputAction::None,
        },
        preset: 249,
    }
}

#[test]
fn queued_event_does_not_reach_next_owner() {
    static QUEUE: EventQueue = EventQueue::new();
    let mut timers = TimerManager::with_queue(SimBus::new(), IrqPolicy::Masked, &QUEUE);
    let mut recorder = Recorder::default();

    let first = timers.ctc_initialize(tick_config(TimerId::Timer0)).unwrap();
    timers.ctc_start_with_interrupt(&first);
    QUEUE.post(TimerEvent::new(TimerId::Timer0, EventKind::CompareA));

    timers.ctc_stop_with_interrupt(&first);
    timers.deinitialize(first);
    let second = timers.ctc_initialize(tick_config(TimerId::Timer0)).unwrap();
    timers.ctc_start_with_interrupt(&second);

    assert_eq!(timers.dispatch_pending(&mut recorder), 0);
    assert!(recorder.matches.is_empty());
    assert_eq!(timers.stats().spurious, 1);
    assert_eq!(timers.recorded_state(&second), TimerState::Busy);
}

#[test]
fn restart_discards_events_from_before_the_stop() {
    static QUEUE: EventQueue = EventQueue::new();
    let mut timers = TimerManager::with_queue(SimBus::new(), IrqPolicy::Masked, &QUEUE);
    let mut recorder = Recorder::default();

    let tick = timers.ctc_initialize(tick_config(TimerId::Timer0)).unwrap();
    let other = timers
        .initialize(TimerConfig {
            timer: TimerId::Timer1,
            clock: ClockSource::Div8,
            mode: TimerMode::Autoreload,
            preset: 0,
        })
        .unwrap();
    timers.ctc_start(&tick);
    timers.start(&other);

    QUEUE.post(TimerEvent::new(TimerId::Timer0, EventKind::CompareA));
    QUEUE.post(overflow(TimerId::Timer1));
    QUEUE.post(TimerEvent::new(TimerId::Timer0, EventKind::CompareA));

    timers.ctc_stop(&tick);
    timers.ctc_start(&tick);
    QUEUE.post(TimerEvent::new(TimerId::Timer0, EventKind::CompareA));

    assert_eq!(timers.dispatch_pending(&mut recorder), 2);
    assert_eq!(recorder.matches, vec![(TimerId::Timer0, Channel::A)]);
    assert_eq!(recorder.elapsed, vec![TimerId::Timer1]);
    assert_eq!(
        timers.stats(),
        DispatchStats {
            delivered: 2,
            spurious: 2
        }
    );
}
