pub mod common;

use hallmk_types::keycode::KeyCode;
use rusty_fork::rusty_fork_test;

use crate::common::*;

rusty_fork_test! {
    #[test]
    fn test_simple_tap() {
        let mut bed = TestBed::new(|cfg| {
            set_keycode(cfg, 0, 3, KeyCode::A);
        });

        bed.press(3);
        bed.tick();
        assert_reports(&bed, &[(0, &[KeyCode::A])]);

        bed.run_until(5);
        bed.release(3);
        bed.tick();
        assert_reports(&bed, &[(0, &[KeyCode::A]), (0, &[])]);
    }

    #[test]
    fn test_momentary_layer_with_transparent_fallback() {
        let mut bed = TestBed::new(|cfg| {
            set_keycode(cfg, 0, 0, KeyCode::Mo1);
            set_keycode(cfg, 0, 3, KeyCode::A);
            set_keycode(cfg, 1, 3, KeyCode::B);
            set_keycode(cfg, 0, 4, KeyCode::C);
            set_keycode(cfg, 1, 4, KeyCode::Transparent);
        });

        // Base layer
        bed.press(3);
        bed.tick();
        bed.release(3);
        bed.tick();

        // Hold the momentary layer key
        bed.press(0);
        bed.tick();
        assert_eq!(bed.keyboard.layout.get_current_layer(), 1);

        bed.press(3);
        bed.tick();
        bed.release(3);
        bed.tick();

        // Transparent on layer 1 falls through to the default layer
        bed.press(4);
        bed.tick();
        bed.release(4);
        bed.tick();

        bed.release(0);
        bed.tick();
        assert_eq!(bed.keyboard.layout.get_current_layer(), 0);

        assert_reports(
            &bed,
            &[
                (0, &[KeyCode::A]),
                (0, &[]),
                (0, &[KeyCode::B]),
                (0, &[]),
                (0, &[KeyCode::C]),
                (0, &[]),
            ],
        );
    }

    #[test]
    fn test_key_lock_toggles_key_disable() {
        let mut bed = TestBed::new(|cfg| {
            set_keycode(cfg, 0, 0, KeyCode::Mo1);
            set_keycode(cfg, 0, 2, KeyCode::A);
            set_keycode(cfg, 1, 2, KeyCode::KeyLock);
        });

        bed.press(2);
        bed.tick();
        bed.release(2);
        bed.tick();

        // Lock position 2 from layer 1
        bed.press(0);
        bed.tick();
        bed.press(2);
        bed.tick();
        bed.release(2);
        bed.tick();
        bed.release(0);
        bed.tick();

        // Locked: the key produces nothing on layer 0
        bed.press(2);
        bed.tick();
        bed.release(2);
        bed.tick();

        // Unlock again; toggling twice restores the original state
        bed.press(0);
        bed.tick();
        bed.press(2);
        bed.tick();
        bed.release(2);
        bed.tick();
        bed.release(0);
        bed.tick();

        bed.press(2);
        bed.tick();
        bed.release(2);
        bed.tick();

        assert_reports(
            &bed,
            &[
                (0, &[KeyCode::A]),
                (0, &[]),
                (0, &[KeyCode::A]),
                (0, &[]),
            ],
        );
    }

    #[test]
    fn test_layer_lock_sets_default_layer() {
        let mut bed = TestBed::new(|cfg| {
            set_keycode(cfg, 0, 1, KeyCode::Mo1);
            set_keycode(cfg, 0, 3, KeyCode::A);
            set_keycode(cfg, 1, 3, KeyCode::B);
            set_keycode(cfg, 1, 5, KeyCode::LayerLock);
        });

        // Lock layer 1 while it is momentarily active
        bed.press(1);
        bed.tick();
        bed.press(5);
        bed.tick();
        bed.release(5);
        bed.tick();
        bed.release(1);
        bed.tick();

        // The momentary key is gone but layer 1 is now the default
        assert_eq!(bed.keyboard.layout.get_current_layer(), 1);
        bed.press(3);
        bed.tick();
        bed.release(3);
        bed.tick();
        assert_reports(&bed, &[(0, &[KeyCode::B]), (0, &[])]);

        // Locking again from the same layer unlocks back to layer 0
        bed.press(5);
        bed.tick();
        bed.release(5);
        bed.tick();
        assert_eq!(bed.keyboard.layout.get_current_layer(), 0);
    }

    #[test]
    fn test_profile_switching() {
        let mut bed = TestBed::new(|cfg| {
            set_keycode(cfg, 0, 3, KeyCode::A);
            set_keycode(cfg, 0, 5, KeyCode::ProfileNext);
            cfg.profiles[1].keymap[0][3] = KeyCode::B;
            cfg.profiles[1].keymap[0][6] = KeyCode::ProfileSwap;
        });

        bed.press(5);
        bed.tick();
        bed.release(5);
        bed.tick();
        assert_eq!(bed.eeconfig.borrow().current_profile, 1);
        assert_eq!(bed.eeconfig.borrow().last_non_default_profile, 1);

        bed.press(3);
        bed.tick();
        bed.release(3);
        bed.tick();
        assert_reports(&bed, &[(0, &[KeyCode::B]), (0, &[])]);

        // Swap back to profile 0
        bed.press(6);
        bed.tick();
        bed.release(6);
        bed.tick();
        assert_eq!(bed.eeconfig.borrow().current_profile, 0);

        bed.clear_reports();
        bed.press(3);
        bed.tick();
        bed.release(3);
        bed.tick();
        assert_reports(&bed, &[(0, &[KeyCode::A]), (0, &[])]);
    }

    #[test]
    fn test_set_profile_is_idempotent() {
        let mut bed = TestBed::new(|cfg| {
            cfg.profiles[1].keymap[0][3] = KeyCode::B;
        });

        assert!(bed.keyboard.layout.set_profile(1));
        assert!(bed.keyboard.layout.set_profile(1));
        assert_eq!(bed.eeconfig.borrow().current_profile, 1);
        assert!(!bed.keyboard.layout.set_profile(NUM_PROFILES as u8));

        bed.press(3);
        bed.tick();
        bed.release(3);
        bed.tick();
        assert_reports(&bed, &[(0, &[KeyCode::B]), (0, &[])]);
    }
}
