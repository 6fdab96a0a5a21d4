//! Built-in hazard catalog.
//!
//! One scenario per classic concurrency anti-pattern, plus a cancellable control variant of the
//! blocked-receiver leak for differential leak-rate comparisons. `double-checked-init` is a
//! control as well: with a real lock around the second check it initializes exactly once, so its
//! race oracle comes out refuted.

use std::time::Duration;

use crate::error::HarnessResult;
use crate::scenario::{Scenario, Workload};

pub const DATA_RACE_COUNTER: &str = "data-race-counter";
pub const GLOBAL_MUTATION: &str = "global-mutation";
pub const LOCK_ORDER_DEADLOCK: &str = "lock-order-deadlock";
pub const CHANNEL_CYCLE_DEADLOCK: &str = "channel-cycle-deadlock";
pub const GOROUTINE_LEAK: &str = "goroutine-leak";
pub const GOROUTINE_LEAK_CANCELLABLE: &str = "goroutine-leak-cancellable";
pub const SEND_ON_CLOSED: &str = "send-on-closed";
pub const BUFFERED_OVERFLOW: &str = "buffered-overflow";
pub const DOUBLE_CLOSE: &str = "double-close";
pub const NIL_SEND: &str = "nil-send";
pub const LAZY_INIT_RACE: &str = "lazy-init-race";
pub const DOUBLE_CHECKED_INIT: &str = "double-checked-init";
pub const RACY_MAP: &str = "racy-map";
pub const WAIT_GROUP_MISUSE: &str = "wait-group-misuse";
pub const SELECT_WITHOUT_DEFAULT: &str = "select-without-default";
pub const SPAWN_CASCADE: &str = "spawn-cascade";

/// Pause between the two lock acquisitions of the lock-order scenario.
pub const LOCK_ORDER_DELAY: Duration = Duration::from_millis(10);

/// Capacity of the undrained handle in the overflow scenario.
pub const OVERFLOW_CAPACITY: usize = 5;
/// Items the overflow scenario tries to push.
pub const OVERFLOW_SENDS: usize = 10;

/// Keys written (and read back) by the racy map scenario.
pub const RACY_MAP_KEYS: u32 = 10;

/// How long a wait-group worker runs before it registers itself.
pub const WAIT_GROUP_STARTUP: Duration = Duration::from_millis(5);

/// Children per task in the spawn cascade.
pub const CASCADE_FAN_OUT: usize = 3;
/// Levels of children below each root of the spawn cascade.
pub const CASCADE_DEPTH: u32 = 3;

/// All built-in scenarios, in catalog order.
pub fn builtin_catalog() -> HarnessResult<Vec<Scenario>> {
    Ok(vec![
        Scenario::builder(DATA_RACE_COUNTER, Workload::CounterRace { increments: 1 })
            .description("1000 tasks increment one counter without synchronization")
            .build()?,
        Scenario::builder(GLOBAL_MUTATION, Workload::GlobalMutation)
            .description("100 tasks each add their index to shared state")
            .build()?,
        Scenario::builder(
            LOCK_ORDER_DEADLOCK,
            Workload::LockOrderInversion {
                delay: LOCK_ORDER_DELAY,
            },
        )
        .description("two tasks take two locks in opposite order")
        .build()?,
        Scenario::builder(CHANNEL_CYCLE_DEADLOCK, Workload::ChannelCycle)
            .description("two tasks send on unbuffered handles before receiving")
            .build()?,
        Scenario::builder(GOROUTINE_LEAK, Workload::BlockedReceivers { cancellable: false })
            .description("10 tasks wait on handles nobody sends to")
            .build()?,
        Scenario::builder(
            GOROUTINE_LEAK_CANCELLABLE,
            Workload::BlockedReceivers { cancellable: true },
        )
        .description("blocked receivers that honour cancellation")
        .build()?,
        Scenario::builder(SEND_ON_CLOSED, Workload::ClosedSend)
            .description("5 tasks send on an already closed handle")
            .build()?,
        Scenario::builder(
            BUFFERED_OVERFLOW,
            Workload::BufferOverflow {
                capacity: OVERFLOW_CAPACITY,
                sends: OVERFLOW_SENDS,
            },
        )
        .description("a sender overfills a buffered handle with no consumer")
        .build()?,
        Scenario::builder(DOUBLE_CLOSE, Workload::DoubleClose)
            .description("a handle is closed twice")
            .build()?,
        Scenario::builder(NIL_SEND, Workload::NilSend)
            .description("a task sends on a nil handle")
            .build()?,
        Scenario::builder(
            LAZY_INIT_RACE,
            Workload::LazyInit {
                double_checked: false,
            },
        )
        .description("100 tasks lazily initialize one instance with check-then-act")
        .build()?,
        Scenario::builder(
            DOUBLE_CHECKED_INIT,
            Workload::LazyInit {
                double_checked: true,
            },
        )
        .description("double-checked locking; the locked second check keeps it to one init")
        .build()?,
        Scenario::builder(
            RACY_MAP,
            Workload::RacyMap {
                keys: RACY_MAP_KEYS,
            },
        )
        .description("10 writers and 10 readers share one unsynchronized map")
        .build()?,
        Scenario::builder(
            WAIT_GROUP_MISUSE,
            Workload::WaitGroupMisuse {
                startup: WAIT_GROUP_STARTUP,
            },
        )
        .description("workers add themselves to the wait group from inside their task")
        .build()?,
        Scenario::builder(SELECT_WITHOUT_DEFAULT, Workload::SelectWithoutDefault)
            .description("tasks select over two silent handles with no fallback")
            .build()?,
        Scenario::builder(
            SPAWN_CASCADE,
            Workload::SpawnCascade {
                fan_out: CASCADE_FAN_OUT,
                depth: CASCADE_DEPTH,
            },
        )
        .description("tasks spawn children recursively and never wait for them")
        .build()?,
    ])
}
