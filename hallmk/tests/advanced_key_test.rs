pub mod common;

use hallmk_types::config::{
    AdvancedBehavior, DynamicKeystroke, MacroKey, NullBind, NullBindBehavior, Toggle,
};
use hallmk_types::keyboard_macro::MacroOperation;
use hallmk_types::keycode::KeyCode;
use rusty_fork::rusty_fork_test;

use crate::common::*;

const LSHIFT: u8 = 0x02;

rusty_fork_test! {
    #[test]
    fn test_toggle_tap_locks_key_on() {
        let mut bed = TestBed::new(|cfg| {
            set_advanced_key(
                cfg,
                0,
                0,
                4,
                AdvancedBehavior::Toggle(Toggle {
                    keycode: KeyCode::C,
                    tapping_term: 200,
                }),
            );
        });

        // Quick tap: the keycode stays registered after release
        bed.press(4);
        bed.tick();
        bed.run_until(50);
        bed.release(4);
        bed.tick();
        assert_reports(&bed, &[(0, &[KeyCode::C])]);
        assert_eq!(bed.held(), (0, vec![KeyCode::C as u8]));

        // Second tap toggles it off on release
        bed.run_until(100);
        bed.press(4);
        bed.tick();
        bed.run_until(120);
        bed.release(4);
        bed.tick();
        assert_eq!(bed.held(), (0, vec![]));
    }

    #[test]
    fn test_toggle_held_past_term_reverts_to_momentary() {
        let mut bed = TestBed::new(|cfg| {
            set_advanced_key(
                cfg,
                0,
                0,
                4,
                AdvancedBehavior::Toggle(Toggle {
                    keycode: KeyCode::C,
                    tapping_term: 200,
                }),
            );
        });

        bed.press(4);
        bed.tick();
        assert_eq!(bed.held(), (0, vec![KeyCode::C as u8]));

        // Held past the term: releasing now releases the keycode
        bed.run_until(250);
        bed.release(4);
        bed.tick();
        assert_eq!(bed.held(), (0, vec![]));
    }

    #[test]
    fn test_null_bind_last_input_priority() {
        let mut bed = TestBed::new(|cfg| {
            set_keycode(cfg, 0, 1, KeyCode::A);
            set_keycode(cfg, 0, 2, KeyCode::B);
            set_advanced_key(
                cfg,
                0,
                0,
                1,
                AdvancedBehavior::NullBind(NullBind {
                    secondary_key: 2,
                    behavior: NullBindBehavior::Last,
                    bottom_out_point: 0,
                }),
            );
        });

        bed.press(1);
        bed.tick();
        assert_reports(&bed, &[(0, &[KeyCode::A])]);

        // The later press takes over; the earlier key is suppressed
        bed.run_until(10);
        bed.press(2);
        bed.tick();
        assert_reports(&bed, &[(0, &[KeyCode::A]), (0, &[KeyCode::B])]);

        // Releasing the later key re-registers the one still held
        bed.run_until(20);
        bed.release(2);
        bed.tick();
        assert_reports(
            &bed,
            &[(0, &[KeyCode::A]), (0, &[KeyCode::B]), (0, &[KeyCode::A])],
        );

        bed.release(1);
        bed.tick();
        assert_eq!(bed.held(), (0, vec![]));
    }

    #[test]
    fn test_null_bind_neutral_releases_both() {
        let mut bed = TestBed::new(|cfg| {
            set_keycode(cfg, 0, 1, KeyCode::A);
            set_keycode(cfg, 0, 2, KeyCode::B);
            set_advanced_key(
                cfg,
                0,
                0,
                1,
                AdvancedBehavior::NullBind(NullBind {
                    secondary_key: 2,
                    behavior: NullBindBehavior::Neutral,
                    bottom_out_point: 0,
                }),
            );
        });

        bed.press(1);
        bed.tick();
        bed.run_until(10);
        bed.press(2);
        bed.tick();
        // Both held: both released
        assert_eq!(bed.held(), (0, vec![]));

        bed.run_until(20);
        bed.release(2);
        bed.tick();
        assert_eq!(bed.held(), (0, vec![KeyCode::A as u8]));
    }

    #[test]
    fn test_null_bind_distance_follows_deeper_key() {
        let mut bed = TestBed::new(|cfg| {
            set_keycode(cfg, 0, 1, KeyCode::A);
            set_keycode(cfg, 0, 2, KeyCode::B);
            set_advanced_key(
                cfg,
                0,
                0,
                1,
                AdvancedBehavior::NullBind(NullBind {
                    secondary_key: 2,
                    behavior: NullBindBehavior::Distance,
                    bottom_out_point: 0,
                }),
            );
        });

        bed.set_travel(1, 200);
        bed.tick();
        bed.run_until(10);
        bed.set_travel(2, 150);
        bed.tick();
        // The deeper key wins
        assert_eq!(bed.held(), (0, vec![KeyCode::A as u8]));

        // Pushing the other key deeper flips the resolution without any new
        // press or release edge
        bed.run_until(20);
        bed.set_travel(2, 250);
        bed.tick();
        assert_eq!(bed.held(), (0, vec![KeyCode::B as u8]));
    }

    #[test]
    fn test_dynamic_keystroke_parts() {
        let mut bed = TestBed::new(|cfg| {
            set_advanced_key(
                cfg,
                0,
                0,
                3,
                AdvancedBehavior::DynamicKeystroke(DynamicKeystroke {
                    keycodes: [KeyCode::A, KeyCode::B, KeyCode::No, KeyCode::No],
                    // A: press on press, release on release
                    // B: press on bottom-out, release on release-from-bottom-out
                    bitmap: [0b1000_0001, 0b0010_0100, 0, 0],
                    bottom_out_point: 230,
                }),
            );
        });

        // Press to normal depth: only A goes down (via the deferred queue)
        bed.set_travel(3, 200);
        bed.tick();
        assert_eq!(bed.held(), (0, vec![KeyCode::A as u8]));

        // Bottom out: B joins
        bed.run_until(10);
        bed.set_travel(3, 250);
        bed.tick();
        assert_eq!(bed.held(), (0, vec![KeyCode::A as u8, KeyCode::B as u8]));

        // Ease off the bottom: B releases, A stays
        bed.run_until(20);
        bed.set_travel(3, 200);
        bed.tick();
        assert_eq!(bed.held(), (0, vec![KeyCode::A as u8]));

        // Full release: A releases
        bed.run_until(30);
        bed.set_travel(3, 0);
        bed.tick();
        assert_eq!(bed.held(), (0, vec![]));
    }

    #[test]
    fn test_macro_playback_with_delay() {
        let mut bed = TestBed::new(|cfg| {
            set_advanced_key(cfg, 0, 0, 7, AdvancedBehavior::Macro(MacroKey { macro_index: 0 }));
            cfg.macros[0].events[0] = MacroOperation::Press(KeyCode::LShift);
            cfg.macros[0].events[1] = MacroOperation::Tap(KeyCode::A);
            cfg.macros[0].events[2] = MacroOperation::Delay(2);
            cfg.macros[0].events[3] = MacroOperation::Tap(KeyCode::B);
            cfg.macros[0].events[4] = MacroOperation::Release(KeyCode::LShift);
        });

        bed.press(7);
        bed.tick();
        // First burst: shift down, A tapped, then the delay suspends playback
        assert_reports(&bed, &[(LSHIFT, &[KeyCode::A]), (LSHIFT, &[])]);

        // Playback resumes after the delay
        bed.run_until(30);
        assert_reports(
            &bed,
            &[
                (LSHIFT, &[KeyCode::A]),
                (LSHIFT, &[]),
                (0, &[KeyCode::B]),
                (0, &[]),
            ],
        );

        bed.release(7);
        bed.tick();
        assert_eq!(bed.held(), (0, vec![]));
    }
}
