// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

use std::rc::Rc;

use twinring_track::entity::{Entity, toplevel};
use twinring_track::id::Unique;
use twinring_track::test_helpers::check_and_clear;
use twinring_track::{Id, create, create_id, debug, enter, error, exit, info, test_init};

struct Reservation {
    id: Id,
    source: usize,
}

impl Unique for Reservation {
    fn id(&self) -> Id {
        self.id
    }
}

impl std::fmt::Display for Reservation {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "reservation from {}", self.source)
    }
}

#[test]
fn log_levels() {
    let (test_tracker, tracker) = test_init!(100);
    let top = toplevel(&tracker, "top");
    let rx = Rc::new(Entity::new(&top, "rx3"));
    check_and_clear(&test_tracker, &["created 100, top", "created 101, top::rx3"]);

    debug!(rx ; "queued {}", 4);
    info!(rx ; "listening");
    error!(top ; "fault at {:.1}ns", 15.0);
    check_and_clear(
        &test_tracker,
        &[
            r"101:DEBUG: queued 4",
            r"101:INFO: listening",
            r"100:ERROR: fault at 15\.0ns",
        ],
    );
}

#[test]
fn objects_enter_and_exit() {
    let (test_tracker, tracker) = test_init!(1);
    let top = toplevel(&tracker, "top");
    let ring = Rc::new(Entity::new(&top, "ring"));
    let reservation = Reservation {
        id: create_id!(ring),
        source: 7,
    };
    create!(ring ; reservation, 12);
    enter!(ring ; reservation.id());
    exit!(ring ; reservation.id());

    check_and_clear(
        &test_tracker,
        &[
            "0: created 1, top",
            "1: created 2, top::ring",
            "2: created 3, reservation from 7, 12 bytes",
            "2: 3 entered",
            "2: 3 exited",
        ],
    );
}
