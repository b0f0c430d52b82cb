// Copyright 2019 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

use rand::Rng;
use std::time::Duration;

/// Trait defining [CoAP transmission parameters][tp].
///
/// [tp]: https://tools.ietf.org/html/rfc7252#section-4.8
pub trait TransParams: Default + Copy + Sync + Send {
    /// The time to wait for an acknowledgement of a confirmable message.
    /// The inter-transmission time doubles for each retransmission.
    const ACK_TIMEOUT: Duration = Duration::from_secs(2);

    /// Timeout multiplier for anti-synchronization.
    const ACK_RANDOM_FACTOR: f32 = 1.5;

    /// The number of retransmissions of confirmable messages to non-multicast
    /// endpoints before the endpoint assumes no acknowledgement will be
    /// received.
    const MAX_RETRANSMIT: u32 = 4;

    /// From RFC7252:
    ///
    /// > `MAX_LATENCY` is the maximum time a datagram is expected to take
    /// > from the start of its transmission to the completion of its
    /// > reception.
    const MAX_LATENCY: Duration = Duration::from_secs(100);

    /// From RFC7252:
    ///
    /// > `PROCESSING_DELAY` is the time a node takes to turn around a
    /// > Confirmable message into an acknowledgement.  We assume the node
    /// > will attempt to send an ACK before having the sender time out, so as
    /// > a conservative assumption we set it equal to `ACK_TIMEOUT`.
    const PROCESSING_DELAY: Duration = Self::ACK_TIMEOUT;

    /// From RFC7252:
    ///
    /// > `MAX_TRANSMIT_SPAN` is the maximum time from the first transmission
    /// > of a Confirmable message to its last retransmission.  For the
    /// > default transmission parameters, the value is (2+4+8+16)*1.5 = 45
    /// > seconds, or more generally:
    /// >
    /// >> `ACK_TIMEOUT * ((2 ** MAX_RETRANSMIT) - 1) * ACK_RANDOM_FACTOR`
    const MAX_TRANSMIT_SPAN: Duration = Duration::from_millis(
        (Self::ACK_TIMEOUT.as_millis() as f32
            * ((1u64 << Self::MAX_RETRANSMIT) - 1) as f32
            * Self::ACK_RANDOM_FACTOR) as u64,
    );

    /// From RFC7252:
    ///
    /// > `MAX_TRANSMIT_WAIT` is the maximum time from the first transmission
    /// > of a Confirmable message to the time when the sender gives up on
    /// > receiving an acknowledgement or reset.  For the default
    /// > transmission parameters, the value is (2+4+8+16+32)*1.5 = 93
    /// > seconds, or more generally:
    /// >
    /// >> `ACK_TIMEOUT * ((2 ** (MAX_RETRANSMIT + 1)) - 1) * ACK_RANDOM_FACTOR`
    const MAX_TRANSMIT_WAIT: Duration = Duration::from_millis(
        (Self::ACK_TIMEOUT.as_millis() as f32
            * ((1u64 << (Self::MAX_RETRANSMIT + 1)) - 1) as f32
            * Self::ACK_RANDOM_FACTOR) as u64,
    );

    /// From RFC7252:
    ///
    /// > `MAX_RTT` is the maximum round-trip time, or:
    /// >
    /// >> `(2 * MAX_LATENCY) + PROCESSING_DELAY`
    ///
    /// Default value is 202 seconds.
    const MAX_RTT: Duration = Duration::from_millis(
        2 * Self::MAX_LATENCY.as_millis() as u64 + Self::PROCESSING_DELAY.as_millis() as u64,
    );

    /// From RFC7252:
    ///
    /// > `EXCHANGE_LIFETIME` is the time from starting to send a Confirmable
    /// > message to the time when an acknowledgement is no longer expected,
    /// > i.e., message-layer information about the message exchange can be
    /// > purged.
    ///
    /// `MAX_TRANSMIT_SPAN + MAX_RTT`, or 247 seconds with the default
    /// transmission parameters.
    const EXCHANGE_LIFETIME: Duration = Duration::from_millis(
        Self::MAX_TRANSMIT_SPAN.as_millis() as u64 + Self::MAX_RTT.as_millis() as u64,
    );

    /// From RFC7252:
    ///
    /// > `NON_LIFETIME` is the time from sending a Non-confirmable message to
    /// > the time its Message ID can be safely reused.
    ///
    /// `MAX_TRANSMIT_SPAN + MAX_LATENCY`, or 145 seconds with the default
    /// transmission parameters.
    const NON_LIFETIME: Duration = Duration::from_millis(
        Self::MAX_TRANSMIT_SPAN.as_millis() as u64 + Self::MAX_LATENCY.as_millis() as u64,
    );

    /// Time after which an endpoint that has not yet produced a response to
    /// an incoming confirmable request sends an empty acknowledgement, turning
    /// the eventual response into a separate one.
    const EMPTY_ACK_DELAY: Duration = Duration::from_millis(100);

    /// Time after which the requester assumes it won't receive any answer.
    /// It is not defined by IETF documents; `MAX_TRANSMIT_WAIT` is the
    /// conservative default.
    const REQUEST_TIMEOUT: Duration = Self::MAX_TRANSMIT_WAIT;

    /// See [`TransParams::ACK_TIMEOUT`].
    fn ack_timeout(&self) -> Duration {
        Self::ACK_TIMEOUT
    }

    /// See [`TransParams::MAX_RETRANSMIT`].
    fn max_retransmit(&self) -> u32 {
        Self::MAX_RETRANSMIT
    }

    /// See [`TransParams::MAX_TRANSMIT_WAIT`].
    fn max_transmit_wait(&self) -> Duration {
        Self::MAX_TRANSMIT_WAIT
    }

    /// See [`TransParams::EXCHANGE_LIFETIME`].
    fn exchange_lifetime(&self) -> Duration {
        Self::EXCHANGE_LIFETIME
    }

    /// See [`TransParams::NON_LIFETIME`].
    fn non_lifetime(&self) -> Duration {
        Self::NON_LIFETIME
    }

    /// See [`TransParams::EMPTY_ACK_DELAY`].
    fn empty_ack_delay(&self) -> Duration {
        Self::EMPTY_ACK_DELAY
    }

    /// Draws the timeout for the first retransmission of a confirmable
    /// message, uniformly distributed over
    /// `[ACK_TIMEOUT, ACK_TIMEOUT * ACK_RANDOM_FACTOR]`. The jitter keeps
    /// independent endpoints from synchronizing their retransmissions.
    fn initial_retransmit_duration(&self) -> Duration {
        const JDIV: u64 = 512u64;
        let rmod: u64 = (JDIV as f32 * (Self::ACK_RANDOM_FACTOR - 1.0)) as u64;
        let jmul = JDIV + rand::thread_rng().gen_range(0..=rmod);

        Duration::from_millis(Self::ACK_TIMEOUT.as_millis() as u64 * jmul / JDIV)
    }
}

/// Set of the standard transmission parameters as recommended by
/// [IETF-RFC7252 Section 4.8].
///
/// [IETF-RFC7252 Section 4.8]: https://tools.ietf.org/html/rfc7252#section-4.8
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct StandardCoapParams;

impl TransParams for StandardCoapParams {}
