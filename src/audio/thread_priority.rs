// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use thread_priority::{set_current_thread_priority, ThreadPriority, ThreadPriorityValue};
use tracing::{info, warn};

/// Default priority for the render thread when SAMPLERBOX_THREAD_PRIORITY is unset.
const DEFAULT_RENDER_THREAD_PRIORITY: u8 = 70;

/// Settings for the thread that renders audio, read once before the stream starts.
#[derive(Debug, Clone, Copy)]
pub struct RenderPriority {
    priority: u8,
    realtime: bool,
}

impl RenderPriority {
    /// Reads SAMPLERBOX_THREAD_PRIORITY (0-99) and SAMPLERBOX_DISABLE_RT_AUDIO.
    pub fn from_env() -> RenderPriority {
        let priority = std::env::var("SAMPLERBOX_THREAD_PRIORITY")
            .ok()
            .and_then(|v| parse_priority(&v))
            .unwrap_or(DEFAULT_RENDER_THREAD_PRIORITY);
        RenderPriority {
            priority,
            realtime: !env_flag("SAMPLERBOX_DISABLE_RT_AUDIO"),
        }
    }

    /// Applies the priority to the current thread. Only the first call does anything.
    pub fn apply_once(&self, applied: &mut bool) {
        if *applied {
            return;
        }
        *applied = true;

        let Ok(value) = ThreadPriorityValue::try_from(self.priority) else {
            warn!(priority = self.priority, "Invalid render thread priority");
            return;
        };
        let tp = ThreadPriority::Crossplatform(value);
        if let Err(e) = set_current_thread_priority(tp) {
            warn!(err = ?e, "Failed to raise render thread priority");
        }

        #[cfg(unix)]
        if self.realtime {
            use thread_priority::unix::{
                set_thread_priority_and_policy, thread_native_id, RealtimeThreadSchedulePolicy,
                ThreadSchedulePolicy,
            };
            match set_thread_priority_and_policy(
                thread_native_id(),
                tp,
                ThreadSchedulePolicy::Realtime(RealtimeThreadSchedulePolicy::Fifo),
            ) {
                Ok(()) => info!("Enabled RT SCHED_FIFO for render thread"),
                Err(e) => warn!(err = %e, "Failed to set RT SCHED_FIFO for render thread"),
            }
        }
    }
}

fn parse_priority(value: &str) -> Option<u8> {
    value.trim().parse::<u8>().ok().filter(|n| *n < 100)
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| {
            v == "1"
                || v.eq_ignore_ascii_case("true")
                || v.eq_ignore_ascii_case("yes")
                || v.eq_ignore_ascii_case("on")
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_priority() {
        assert_eq!(parse_priority("80"), Some(80));
        assert_eq!(parse_priority(" 0 "), Some(0));
        assert_eq!(parse_priority("100"), None);
        assert_eq!(parse_priority("high"), None);
    }
}
