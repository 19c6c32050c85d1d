pub mod common;

use hallmk_types::config::Actuation;
use hallmk_types::keycode::KeyCode;
use rusty_fork::rusty_fork_test;

use crate::common::*;

rusty_fork_test! {
    #[test]
    fn test_rapid_trigger_half_press_release() {
        let mut bed = TestBed::new(|cfg| {
            set_keycode(cfg, 0, 0, KeyCode::A);
            set_actuation(
                cfg,
                0,
                Actuation {
                    actuation_point: 40,
                    rt_down: 10,
                    rt_up: 10,
                    continuous: false,
                },
            );
        });

        // Travel past the actuation point
        bed.set_travel(0, 60);
        bed.tick();
        assert_reports(&bed, &[(0, &[KeyCode::A])]);

        // Small backoff, within the release sensitivity: still pressed
        bed.set_travel(0, 52);
        bed.tick();
        assert_reports(&bed, &[(0, &[KeyCode::A])]);

        // Further backoff releases well above the actuation point
        bed.set_travel(0, 48);
        bed.tick();
        assert_reports(&bed, &[(0, &[KeyCode::A]), (0, &[])]);

        // Small re-press triggers again without passing the actuation point
        // from rest
        bed.set_travel(0, 59);
        bed.tick();
        assert_reports(&bed, &[(0, &[KeyCode::A]), (0, &[]), (0, &[KeyCode::A])]);

        // Full release
        bed.set_travel(0, 0);
        bed.tick();
        assert_reports(
            &bed,
            &[(0, &[KeyCode::A]), (0, &[]), (0, &[KeyCode::A]), (0, &[])],
        );
    }

    #[test]
    fn test_fixed_actuation_ignores_reversals() {
        let mut bed = TestBed::new(|cfg| {
            set_keycode(cfg, 0, 0, KeyCode::A);
            set_actuation(
                cfg,
                0,
                Actuation {
                    actuation_point: 40,
                    rt_down: 0,
                    rt_up: 0,
                    continuous: false,
                },
            );
        });

        bed.set_travel(0, 60);
        bed.tick();
        // The same reversal that releases a Rapid Trigger key changes nothing
        bed.set_travel(0, 48);
        bed.tick();
        bed.set_travel(0, 41);
        bed.tick();
        assert_reports(&bed, &[(0, &[KeyCode::A])]);

        bed.set_travel(0, 39);
        bed.tick();
        assert_reports(&bed, &[(0, &[KeyCode::A]), (0, &[])]);
    }

    #[test]
    fn test_same_scan_press_order_defers_shallower_key() {
        let mut bed = TestBed::new(|cfg| {
            set_keycode(cfg, 0, 0, KeyCode::A);
            set_keycode(cfg, 0, 1, KeyCode::B);
        });

        // Both keys cross actuation in the same scan; key 1 overshoots deeper
        // so it must reach the report first
        bed.set_travel(0, 150);
        bed.set_travel(1, 250);
        bed.tick();
        assert_reports(&bed, &[(0, &[KeyCode::B])]);

        // The shallower key follows one scan later
        bed.tick();
        assert_reports(&bed, &[(0, &[KeyCode::B]), (0, &[KeyCode::A, KeyCode::B])]);
    }
}
