use atmega328p_firmware::hal::irq::IrqPolicy;
use atmega328p_firmware::hal::regs::RegisterBus;
use atmega328p_firmware::hal::sim::SimBus;
use atmega328p_firmware::hal::timer::unit::{CS_MASK, OCFA, OCFB, OCIEA, TOIE, TOV};
use atmega328p_firmware::hal::timer::{
    Channel, ClockSource, OutputAction, TimerConfig, TimerError, TimerId, TimerManager, TimerMode, TimerState,
};

fn manager() -> TimerManager<SimBus> {
    TimerManager::new(SimBus::new(), IrqPolicy::Masked)
}

fn base(timer: TimerId, clock: ClockSource, mode: TimerMode, preset: u16) -> TimerConfig {
    TimerConfig {
        timer,
        clock,
        mode,
        preset,
    }
}

fn ctc(timer: TimerId, channel: Channel, output: OutputAction, preset: u16) -> TimerConfig {
    TimerConfig {
        timer,
        clock: ClockSource::Div64,
        mode: TimerMode::Ctc { channel, output },
        preset,
    }
}

#[test]
fn unit_has_at_most_one_owner() {
    let mut timers = manager();
    let config = base(TimerId::Timer0, ClockSource::Div64, TimerMode::Autoreload, 0);

    let first = timers.initialize(config).unwrap();
    assert!(!timers.is_available(TimerId::Timer0));
    assert_eq!(timers.initialize(config).err(), Some(TimerError::AlreadyOwned));
    assert_eq!(
        timers
            .ctc_initialize(ctc(TimerId::Timer0, Channel::A, OutputAction::None, 10))
            .err(),
        Some(TimerError::AlreadyOwned)
    );

    // Other units are unaffected
    let other = timers
        .initialize(base(TimerId::Timer2, ClockSource::Div32, TimerMode::OneShot, 0))
        .unwrap();
    assert_eq!(other.id(), TimerId::Timer2);

    timers.deinitialize(first);
    assert!(timers.is_available(TimerId::Timer0));
    let again = timers.initialize(config).unwrap();
    assert_eq!(again.id(), TimerId::Timer0);
}

#[test]
fn rejected_init_leaves_unit_free() {
    let mut timers = manager();

    assert_eq!(
        timers
            .initialize(base(TimerId::Timer0, ClockSource::Div32, TimerMode::Autoreload, 0))
            .err(),
        Some(TimerError::InvalidClockSource)
    );
    assert_eq!(
        timers
            .initialize(base(TimerId::Timer2, ClockSource::ExternalRising, TimerMode::Autoreload, 0))
            .err(),
        Some(TimerError::InvalidClockSource)
    );
    assert_eq!(
        timers
            .initialize(base(TimerId::Timer0, ClockSource::Div8, TimerMode::Autoreload, 0x100))
            .err(),
        Some(TimerError::PresetOutOfRange)
    );
    assert_eq!(
        timers
            .initialize(ctc(TimerId::Timer1, Channel::A, OutputAction::None, 10))
            .err(),
        Some(TimerError::InvalidMode)
    );
    assert_eq!(
        timers
            .ctc_initialize(base(TimerId::Timer1, ClockSource::Div8, TimerMode::OneShot, 0))
            .err(),
        Some(TimerError::InvalidMode)
    );

    assert!(TimerId::ALL.iter().all(|id| timers.is_available(*id)));
}

#[test]
fn start_loads_preset_and_stop_removes_clock() {
    let mut timers = manager();
    let unit = TimerId::Timer1.unit();
    let handle = timers
        .initialize(base(TimerId::Timer1, ClockSource::Div256, TimerMode::Autoreload, 0xABCD))
        .unwrap();
    assert_eq!(timers.recorded_state(&handle), TimerState::Ready);

    timers.start(&handle);
    assert_eq!(timers.counter(&handle), 0xABCD);
    assert_eq!(timers.bus().peek(unit.tccrb) & CS_MASK, 0b100);
    assert_eq!(timers.state(&handle), TimerState::Busy);

    timers.stop(&handle);
    assert!(!timers.is_counting(TimerId::Timer1));
    assert_eq!(timers.state(&handle), TimerState::Ready);
}

#[test]
fn every_state_stays_in_the_closed_set() {
    let mut timers = manager();
    let handle = timers
        .initialize(base(TimerId::Timer0, ClockSource::Div8, TimerMode::Autoreload, 0))
        .unwrap();
    let unit = TimerId::Timer0.unit();
    let allowed = [TimerState::Ready, TimerState::Busy, TimerState::Timeout, TimerState::Match];

    let mut seen = Vec::new();
    seen.push(timers.state(&handle));
    timers.start_with_interrupt(&handle);
    seen.push(timers.state(&handle));
    timers.bus_mut().raise(unit.tifr, TOV | OCFA | OCFB);
    seen.push(timers.state(&handle));
    seen.push(timers.state(&handle));
    timers.stop_with_interrupt(&handle);
    seen.push(timers.state(&handle));

    assert!(seen.iter().all(|s| allowed.contains(s)));
    assert_eq!(
        seen,
        vec![
            TimerState::Ready,
            TimerState::Busy,
            TimerState::Timeout,
            TimerState::Busy,
            TimerState::Ready
        ]
    );
}

#[test]
fn one_shot_stops_itself_on_overflow() {
    let mut timers = manager();
    let unit = TimerId::Timer2.unit();
    let handle = timers
        .initialize(base(TimerId::Timer2, ClockSource::Div1024, TimerMode::OneShot, 0x10))
        .unwrap();
    timers.start(&handle);
    assert!(timers.is_counting(TimerId::Timer2));

    timers.bus_mut().raise(unit.tifr, TOV);
    assert_eq!(timers.state(&handle), TimerState::Timeout);
    assert!(!timers.is_counting(TimerId::Timer2));
    assert_eq!(timers.bus().peek(unit.tifr) & TOV, 0);
    assert_eq!(timers.state(&handle), TimerState::Ready);
}

#[test]
fn autoreload_keeps_counting_after_overflow() {
    let mut timers = manager();
    let unit = TimerId::Timer0.unit();
    let handle = timers
        .initialize(base(TimerId::Timer0, ClockSource::Div64, TimerMode::Autoreload, 6))
        .unwrap();
    timers.start(&handle);

    for _ in 0..3 {
        timers.bus_mut().raise(unit.tifr, TOV);
        assert_eq!(timers.state(&handle), TimerState::Timeout);
        assert!(timers.is_counting(TimerId::Timer0));
    }
}

#[test]
fn interrupt_start_clears_stale_flag_and_unmasks() {
    let mut timers = manager();
    let unit = TimerId::Timer0.unit();
    timers.bus_mut().raise(unit.tifr, TOV | OCFA);
    let handle = timers
        .initialize(base(TimerId::Timer0, ClockSource::Div64, TimerMode::Autoreload, 0))
        .unwrap();

    timers.start_with_interrupt(&handle);
    assert_eq!(timers.bus().peek(unit.tifr), OCFA);
    assert_eq!(timers.bus().peek(unit.timsk), TOIE);

    timers.stop_with_interrupt(&handle);
    assert_eq!(timers.bus().peek(unit.timsk), 0);
}

#[test]
fn ctc_compare_value_round_trips() {
    let mut timers = manager();

    let narrow = timers
        .ctc_initialize(ctc(TimerId::Timer0, Channel::A, OutputAction::None, 251))
        .unwrap();
    let wide = timers
        .ctc_initialize(ctc(TimerId::Timer1, Channel::A, OutputAction::None, 251))
        .unwrap();
    assert_eq!(timers.compare_value(&narrow), 251);
    assert_eq!(timers.compare_value(&wide), 251);

    let unit = TimerId::Timer1.unit();
    timers.deinitialize(wide);
    let wide = timers
        .ctc_initialize(ctc(TimerId::Timer1, Channel::A, OutputAction::None, 0x1234))
        .unwrap();
    assert_eq!(timers.compare_value(&wide), 0x1234);
    assert_eq!(timers.bus().peek(unit.tccrb) & 0b0000_1000, 0b0000_1000);
}

#[test]
fn ctc_init_selects_mode_and_output_action() {
    let mut timers = manager();
    let unit = TimerId::Timer0.unit();
    let handle = timers
        .ctc_initialize(ctc(TimerId::Timer0, Channel::A, OutputAction::Toggle, 249))
        .unwrap();

    assert_eq!(timers.bus().peek(unit.tccra), 0b0100_0010);
    assert!(!timers.is_counting(TimerId::Timer0));

    timers.ctc_start_with_interrupt(&handle);
    assert_eq!(timers.bus().peek(unit.tccrb) & CS_MASK, 0b011);
    assert_eq!(timers.bus().peek(unit.timsk), OCIEA);
    assert_eq!(timers.counter(&handle), 0);
}

#[test]
fn channel_b_also_defines_top() {
    let mut timers = manager();
    let unit = TimerId::Timer2.unit();
    let handle = timers
        .ctc_initialize(ctc(TimerId::Timer2, Channel::B, OutputAction::Clear, 99))
        .unwrap();

    assert_eq!(timers.compare_value(&handle), 99);
    assert_eq!(timers.bus().read(unit.tccra), 0b0010_0010);
    assert_eq!(TimerId::Timer2.output_pin(Channel::B), (atmega328p_firmware::hal::Port::D, 1 << 3));
}

#[test]
fn match_flag_is_reported_once() {
    let mut timers = manager();
    let unit = TimerId::Timer0.unit();
    let handle = timers
        .ctc_initialize(ctc(TimerId::Timer0, Channel::A, OutputAction::None, 249))
        .unwrap();
    timers.ctc_start(&handle);

    timers.bus_mut().raise(unit.tifr, OCFA | OCFB);
    assert_eq!(timers.state(&handle), TimerState::Match);
    assert_eq!(timers.state(&handle), TimerState::Busy);
    // The other channel's flag is left alone
    assert_eq!(timers.bus().peek(unit.tifr), OCFB);

    timers.ctc_stop(&handle);
    assert!(!timers.is_counting(TimerId::Timer0));
}

#[test]
fn stop_all_halts_owned_and_unowned_units() {
    let mut timers = manager();
    let a = timers
        .ctc_initialize(ctc(TimerId::Timer0, Channel::A, OutputAction::None, 249))
        .unwrap();
    let b = timers
        .initialize(base(TimerId::Timer1, ClockSource::Div8, TimerMode::Autoreload, 0))
        .unwrap();
    timers.ctc_start_with_interrupt(&a);
    timers.start_with_interrupt(&b);

    timers.stop_all();

    for id in TimerId::ALL {
        assert!(!timers.is_counting(id));
        assert_eq!(timers.bus().peek(id.unit().timsk), 0);
    }
    assert!(!timers.is_available(TimerId::Timer0));
    assert_eq!(timers.state(&b), TimerState::Ready);
}
