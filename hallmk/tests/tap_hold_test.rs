pub mod common;

use hallmk_types::config::{AdvancedBehavior, TapHold, TapHoldFlags, TapHoldFlavor};
use hallmk_types::keycode::KeyCode;
use rusty_fork::rusty_fork_test;

use crate::common::*;

fn tap_hold_binding(flags: TapHoldFlags) -> AdvancedBehavior {
    AdvancedBehavior::TapHold(TapHold {
        tap_keycode: KeyCode::A,
        hold_keycode: KeyCode::LShift,
        tapping_term: 200,
        flags,
        quick_tap_ms: 0,
        require_prior_idle_ms: 0,
        double_tap_keycode: KeyCode::No,
    })
}

const LSHIFT: u8 = 0x02;

rusty_fork_test! {
    #[test]
    fn test_tap_within_term() {
        let mut bed = TestBed::new(|cfg| {
            set_keycode(cfg, 0, 5, KeyCode::A);
            set_advanced_key(cfg, 0, 0, 5, tap_hold_binding(TapHoldFlags::new()));
        });

        bed.press(5);
        bed.tick();
        assert_reports(&bed, &[]);

        bed.run_until(50);
        bed.release(5);
        bed.tick();
        // The tap registers on release; its release is staged one tick later
        assert_reports(&bed, &[(0, &[KeyCode::A]), (0, &[])]);
    }

    #[test]
    fn test_hold_preferred_held_through_term() {
        let mut bed = TestBed::new(|cfg| {
            set_keycode(cfg, 0, 5, KeyCode::A);
            set_keycode(cfg, 0, 6, KeyCode::B);
            set_advanced_key(cfg, 0, 0, 5, tap_hold_binding(TapHoldFlags::new()));
        });

        bed.press(5);
        bed.tick();

        // B is pressed and released inside the decision window; both events
        // stay buffered behind the undecided Tap-Hold
        bed.run_until(50);
        bed.press(6);
        bed.tick();
        bed.run_until(80);
        bed.release(6);
        bed.tick();
        assert_reports(&bed, &[]);

        // The term elapses: shift resolves, then the buffered B replays
        bed.run_until(202);
        assert_reports(&bed, &[(LSHIFT, &[KeyCode::B]), (LSHIFT, &[])]);

        bed.run_until(250);
        bed.release(5);
        bed.tick();
        assert_reports(&bed, &[(LSHIFT, &[KeyCode::B]), (LSHIFT, &[]), (0, &[])]);
    }

    #[test]
    fn test_permissive_hold_resolves_on_interrupt_release() {
        let mut bed = TestBed::new(|cfg| {
            set_keycode(cfg, 0, 5, KeyCode::A);
            set_keycode(cfg, 0, 6, KeyCode::B);
            set_advanced_key(
                cfg,
                0,
                0,
                5,
                tap_hold_binding(TapHoldFlags::new().with_permissive_hold(true)),
            );
        });

        bed.press(5);
        bed.tick();
        bed.run_until(30);
        bed.press(6);
        bed.tick();
        assert_reports(&bed, &[]);

        // B's release completes a press-and-release pair inside the window:
        // the hold resolves immediately, well before the term
        bed.run_until(60);
        bed.release(6);
        bed.tick();
        bed.tick();
        assert_reports(&bed, &[(LSHIFT, &[KeyCode::B]), (LSHIFT, &[])]);
        assert!(bed.now < 100);

        bed.run_until(100);
        bed.release(5);
        bed.tick();
        assert_reports(&bed, &[(LSHIFT, &[KeyCode::B]), (LSHIFT, &[]), (0, &[])]);
    }

    #[test]
    fn test_hold_on_other_key_press_resolves_immediately() {
        let mut bed = TestBed::new(|cfg| {
            set_keycode(cfg, 0, 5, KeyCode::A);
            set_keycode(cfg, 0, 6, KeyCode::B);
            set_advanced_key(
                cfg,
                0,
                0,
                5,
                tap_hold_binding(TapHoldFlags::new().with_hold_on_other_key_press(true)),
            );
        });

        bed.press(5);
        bed.tick();
        bed.run_until(30);
        bed.press(6);
        bed.tick();
        // B's press alone resolves the hold, and B follows shifted
        assert_reports(&bed, &[(LSHIFT, &[KeyCode::B])]);

        bed.release(6);
        bed.tick();
        bed.release(5);
        bed.tick();
        assert_reports(&bed, &[(LSHIFT, &[KeyCode::B]), (LSHIFT, &[]), (0, &[])]);
    }

    #[test]
    fn test_retro_tapping_emits_tap_after_uninterrupted_hold() {
        let mut bed = TestBed::new(|cfg| {
            set_keycode(cfg, 0, 5, KeyCode::A);
            set_advanced_key(
                cfg,
                0,
                0,
                5,
                tap_hold_binding(TapHoldFlags::new().with_retro_tapping(true)),
            );
        });

        bed.press(5);
        bed.tick();
        bed.run_until(202);
        assert_reports(&bed, &[(LSHIFT, &[])]);

        // Released without any interruption: the tap still fires
        bed.run_until(300);
        bed.release(5);
        bed.tick();
        assert_reports(&bed, &[(LSHIFT, &[]), (0, &[KeyCode::A]), (0, &[])]);
    }

    #[test]
    fn test_quick_tap_repeats_tap_keycode() {
        let mut bed = TestBed::new(|cfg| {
            set_keycode(cfg, 0, 5, KeyCode::A);
            let mut binding = tap_hold_binding(TapHoldFlags::new());
            if let AdvancedBehavior::TapHold(ref mut th) = binding {
                th.quick_tap_ms = 100;
            }
            set_advanced_key(cfg, 0, 0, 5, binding);
        });

        // First tap
        bed.press(5);
        bed.tick();
        bed.run_until(20);
        bed.release(5);
        bed.tick();
        assert_reports(&bed, &[(0, &[KeyCode::A]), (0, &[])]);

        // Re-press inside the quick-tap window: tap keycode goes down
        // immediately and repeats while held, even past the tapping term
        bed.run_until(50);
        bed.press(5);
        bed.tick();
        assert_reports(&bed, &[(0, &[KeyCode::A]), (0, &[]), (0, &[KeyCode::A])]);

        bed.run_until(400);
        bed.release(5);
        bed.tick();
        assert_reports(
            &bed,
            &[(0, &[KeyCode::A]), (0, &[]), (0, &[KeyCode::A]), (0, &[])],
        );
    }

    #[test]
    fn test_double_tap_keycode_emits_on_fast_repress() {
        let mut bed = TestBed::new(|cfg| {
            set_keycode(cfg, 0, 5, KeyCode::A);
            let mut binding = tap_hold_binding(TapHoldFlags::new());
            if let AdvancedBehavior::TapHold(ref mut th) = binding {
                th.quick_tap_ms = 100;
                th.double_tap_keycode = KeyCode::C;
            }
            set_advanced_key(cfg, 0, 0, 5, binding);
        });

        // First tap
        bed.press(5);
        bed.tick();
        bed.run_until(20);
        bed.release(5);
        bed.tick();
        assert_reports(&bed, &[(0, &[KeyCode::A]), (0, &[])]);

        // Re-press inside the window: the double-tap keycode goes down
        // instead of the tap keycode, and wins over the quick-tap path
        bed.run_until(50);
        bed.press(5);
        bed.tick();
        assert_reports(&bed, &[(0, &[KeyCode::A]), (0, &[]), (0, &[KeyCode::C])]);

        bed.run_until(80);
        bed.release(5);
        bed.tick();
        assert_reports(
            &bed,
            &[(0, &[KeyCode::A]), (0, &[]), (0, &[KeyCode::C]), (0, &[])],
        );

        // Outside the window the key is an ordinary Tap-Hold again
        bed.run_until(300);
        bed.press(5);
        bed.tick();
        bed.run_until(320);
        bed.release(5);
        bed.tick();
        assert_reports(
            &bed,
            &[
                (0, &[KeyCode::A]),
                (0, &[]),
                (0, &[KeyCode::C]),
                (0, &[]),
                (0, &[KeyCode::A]),
                (0, &[]),
            ],
        );
    }

    #[test]
    fn test_require_prior_idle_bypasses_decision() {
        let mut bed = TestBed::new(|cfg| {
            set_keycode(cfg, 0, 5, KeyCode::A);
            set_keycode(cfg, 0, 6, KeyCode::B);
            let mut binding = tap_hold_binding(TapHoldFlags::new());
            if let AdvancedBehavior::TapHold(ref mut th) = binding {
                th.require_prior_idle_ms = 150;
            }
            set_advanced_key(cfg, 0, 0, 5, binding);
        });

        // Type a plain key first
        bed.press(6);
        bed.tick();
        bed.run_until(10);
        bed.release(6);
        bed.tick();

        // Rolling onto the Tap-Hold key right after produces the tap with no
        // decision window at all
        bed.run_until(40);
        bed.press(5);
        bed.tick();
        assert_reports(&bed, &[(0, &[KeyCode::B]), (0, &[]), (0, &[KeyCode::A])]);

        bed.run_until(80);
        bed.release(5);
        bed.tick();
        assert_reports(
            &bed,
            &[(0, &[KeyCode::B]), (0, &[]), (0, &[KeyCode::A]), (0, &[])],
        );
    }

    #[test]
    fn test_hold_while_undecided_registers_hold_up_front() {
        let mut bed = TestBed::new(|cfg| {
            set_keycode(cfg, 0, 5, KeyCode::A);
            set_advanced_key(
                cfg,
                0,
                0,
                5,
                tap_hold_binding(TapHoldFlags::new().with_hold_while_undecided(true)),
            );
        });

        bed.press(5);
        bed.tick();
        assert_reports(&bed, &[(LSHIFT, &[])]);

        // Resolving as tap swaps the hold keycode for the tap keycode
        bed.run_until(50);
        bed.release(5);
        bed.tick();
        assert_reports(&bed, &[(LSHIFT, &[]), (0, &[KeyCode::A]), (0, &[])]);
    }

    #[test]
    fn test_tap_unless_interrupted_holds_on_early_press() {
        let mut bed = TestBed::new(|cfg| {
            set_keycode(cfg, 0, 5, KeyCode::A);
            set_keycode(cfg, 0, 6, KeyCode::B);
            set_advanced_key(
                cfg,
                0,
                0,
                5,
                tap_hold_binding(TapHoldFlags::new().with_flavor(TapHoldFlavor::TapUnlessInterrupted)),
            );
        });

        bed.press(5);
        bed.tick();
        bed.run_until(50);
        bed.press(6);
        bed.tick();
        assert_reports(&bed, &[(LSHIFT, &[KeyCode::B])]);

        bed.release(6);
        bed.tick();
        bed.release(5);
        bed.tick();
        assert_reports(&bed, &[(LSHIFT, &[KeyCode::B]), (LSHIFT, &[]), (0, &[])]);
    }

    #[test]
    fn test_tap_unless_interrupted_taps_at_term() {
        let mut bed = TestBed::new(|cfg| {
            set_keycode(cfg, 0, 5, KeyCode::A);
            set_advanced_key(
                cfg,
                0,
                0,
                5,
                tap_hold_binding(TapHoldFlags::new().with_flavor(TapHoldFlavor::TapUnlessInterrupted)),
            );
        });

        bed.press(5);
        bed.tick();
        bed.run_until(202);
        // Term elapsed untouched: the tap keycode goes down and stays down
        assert_reports(&bed, &[(0, &[KeyCode::A])]);

        bed.release(5);
        bed.tick();
        assert_reports(&bed, &[(0, &[KeyCode::A]), (0, &[])]);
    }
}
