pub mod common;

use hallmk_types::config::{AdvancedBehavior, Combo, COMBO_KEY_UNUSED};
use hallmk_types::keycode::KeyCode;
use rusty_fork::rusty_fork_test;

use crate::common::*;

fn combo(keys: &[u8], output: KeyCode, term: u16) -> AdvancedBehavior {
    let mut combo = Combo {
        keys: [COMBO_KEY_UNUSED; 4],
        output_keycode: output,
        term,
    };
    for (slot, &key) in keys.iter().enumerate() {
        combo.keys[slot] = key;
    }
    AdvancedBehavior::Combo(combo)
}

rusty_fork_test! {
    #[test]
    fn test_combo_match() {
        let mut bed = TestBed::new(|cfg| {
            set_keycode(cfg, 0, 1, KeyCode::A);
            set_keycode(cfg, 0, 2, KeyCode::B);
            set_advanced_key(cfg, 0, 0, 1, combo(&[1, 2], KeyCode::Escape, 50));
        });

        bed.press(1);
        bed.tick();
        // Queued, nothing visible yet
        assert_reports(&bed, &[]);

        bed.run_until(20);
        bed.press(2);
        bed.tick();
        // Both keys arrived within the term: the combo fires as a press with
        // a deferred release; the constituent keycodes never appear
        assert_reports(&bed, &[(0, &[KeyCode::Escape]), (0, &[])]);

        bed.release(1);
        bed.release(2);
        bed.run_until(40);
        assert_reports(&bed, &[(0, &[KeyCode::Escape]), (0, &[])]);
    }

    #[test]
    fn test_combo_timeout_flushes_queue() {
        let mut bed = TestBed::new(|cfg| {
            set_keycode(cfg, 0, 1, KeyCode::A);
            set_keycode(cfg, 0, 2, KeyCode::B);
            set_advanced_key(cfg, 0, 0, 1, combo(&[1, 2], KeyCode::Escape, 50));
        });

        bed.press(1);
        bed.tick();
        assert_reports(&bed, &[]);

        // The partial combo ages out and the press replays as a plain key
        bed.run_until(60);
        assert_reports(&bed, &[(0, &[KeyCode::A])]);

        bed.release(1);
        bed.tick();
        assert_reports(&bed, &[(0, &[KeyCode::A]), (0, &[])]);
    }

    #[test]
    fn test_longest_combo_wins() {
        let mut bed = TestBed::new(|cfg| {
            set_keycode(cfg, 0, 1, KeyCode::A);
            set_keycode(cfg, 0, 2, KeyCode::B);
            set_keycode(cfg, 0, 3, KeyCode::C);
            set_advanced_key(cfg, 0, 0, 1, combo(&[1, 2], KeyCode::Escape, 50));
            set_advanced_key(cfg, 1, 0, 1, combo(&[1, 2, 3], KeyCode::Tab, 50));
        });

        bed.press(1);
        bed.tick();
        bed.run_until(10);
        bed.press(2);
        bed.tick();
        // The two-key combo already matches, but the three-key candidate is
        // still alive, so arbitration waits
        assert_reports(&bed, &[]);

        bed.run_until(20);
        bed.press(3);
        bed.tick();
        assert_reports(&bed, &[(0, &[KeyCode::Tab]), (0, &[])]);
    }

    #[test]
    fn test_shorter_combo_commits_when_longer_times_out() {
        let mut bed = TestBed::new(|cfg| {
            set_keycode(cfg, 0, 1, KeyCode::A);
            set_keycode(cfg, 0, 2, KeyCode::B);
            set_keycode(cfg, 0, 3, KeyCode::C);
            set_advanced_key(cfg, 0, 0, 1, combo(&[1, 2], KeyCode::Escape, 50));
            set_advanced_key(cfg, 1, 0, 1, combo(&[1, 2, 3], KeyCode::Tab, 50));
        });

        bed.press(1);
        bed.tick();
        bed.run_until(10);
        bed.press(2);
        bed.tick();
        assert_reports(&bed, &[]);

        // The third key never arrives; once the window closes the best full
        // match commits
        bed.run_until(60);
        assert_reports(&bed, &[(0, &[KeyCode::Escape]), (0, &[])]);
    }

    #[test]
    fn test_combo_key_release_cancels_candidates() {
        let mut bed = TestBed::new(|cfg| {
            set_keycode(cfg, 0, 1, KeyCode::A);
            set_keycode(cfg, 0, 2, KeyCode::B);
            set_advanced_key(cfg, 0, 0, 1, combo(&[1, 2], KeyCode::Escape, 50));
        });

        // A quick tap of a combo key alone must still type its keycode
        bed.press(1);
        bed.tick();
        bed.run_until(10);
        bed.release(1);
        bed.tick();
        bed.tick();
        assert_reports(&bed, &[(0, &[KeyCode::A]), (0, &[])]);
    }

    #[test]
    fn test_foreign_press_flushes_queue_in_order() {
        let mut bed = TestBed::new(|cfg| {
            set_keycode(cfg, 0, 1, KeyCode::A);
            set_keycode(cfg, 0, 2, KeyCode::B);
            set_keycode(cfg, 0, 6, KeyCode::C);
            set_advanced_key(cfg, 0, 0, 1, combo(&[1, 2], KeyCode::Escape, 50));
        });

        bed.press(1);
        bed.tick();
        bed.run_until(10);
        // A non-combo key press flushes the queued combo press first, so the
        // report order matches the physical press order
        bed.press(6);
        bed.tick();
        assert_reports(&bed, &[(0, &[KeyCode::A, KeyCode::C])]);

        bed.release(1);
        bed.tick();
        bed.release(6);
        bed.tick();
        assert_reports(&bed, &[(0, &[KeyCode::A, KeyCode::C]), (0, &[KeyCode::C]), (0, &[])]);
    }

    #[test]
    fn test_combo_on_other_layer_does_not_consume() {
        let mut bed = TestBed::new(|cfg| {
            set_keycode(cfg, 0, 1, KeyCode::A);
            set_keycode(cfg, 0, 2, KeyCode::B);
            set_advanced_key(cfg, 0, 1, 1, combo(&[1, 2], KeyCode::Escape, 50));
        });

        // The combo lives on layer 1; on layer 0 the keys type normally with
        // no queueing delay
        bed.press(1);
        bed.tick();
        assert_reports(&bed, &[(0, &[KeyCode::A])]);
    }
}
