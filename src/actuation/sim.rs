//! Simulated servo and indicator.
//!
//! Both outputs append to a shared `SimTrace` so a bench run or a test can see
//! exactly which commands reached the "hardware". The trace is a ring: once it
//! holds `capacity` events the oldest are evicted. Failures can be injected per
//! output.

use anyhow::{anyhow, Result};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{Angle, IndicatorOutput, ServoOutput};

/// One recorded output event.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SimEvent {
    ServoDrive { duty_percent: f32 },
    ServoIdle,
    ServoRelease,
    Indicator { on: bool },
    IndicatorRelease,
}

/// Events kept by `SimTrace::new`.
pub const DEFAULT_TRACE_CAPACITY: usize = 4096;

#[derive(Debug)]
struct TraceInner {
    events: VecDeque<SimEvent>,
    capacity: usize,
    evicted: u64,
    servo_released: bool,
    indicator_released: bool,
    fail_servo: bool,
    fail_indicator: bool,
}

/// Shared, cloneable record of simulated output activity.
#[derive(Clone, Debug)]
pub struct SimTrace {
    inner: Arc<Mutex<TraceInner>>,
}

impl Default for SimTrace {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_TRACE_CAPACITY)
    }
}

impl SimTrace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trace keeping at most the `capacity` most recent events (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(Mutex::new(TraceInner {
                events: VecDeque::with_capacity(capacity.min(DEFAULT_TRACE_CAPACITY)),
                capacity,
                evicted: 0,
                servo_released: false,
                indicator_released: false,
                fail_servo: false,
                fail_indicator: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TraceInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, event: SimEvent) {
        let mut inner = self.lock();
        match event {
            SimEvent::ServoRelease => inner.servo_released = true,
            SimEvent::IndicatorRelease => inner.indicator_released = true,
            _ => {}
        }
        if inner.events.len() == inner.capacity {
            inner.events.pop_front();
            inner.evicted += 1;
        }
        inner.events.push_back(event);
    }

    /// Retained events, oldest first.
    pub fn events(&self) -> Vec<SimEvent> {
        self.lock().events.iter().copied().collect()
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }

    /// Events dropped from the front of the ring so far.
    pub fn evicted(&self) -> u64 {
        self.lock().evicted
    }

    /// Angles the servo was driven to, in order.
    pub fn servo_angles(&self) -> Vec<Angle> {
        self.lock()
            .events
            .iter()
            .filter_map(|e| match e {
                SimEvent::ServoDrive { duty_percent } => {
                    Some(Angle::from_duty_percent(*duty_percent))
                }
                _ => None,
            })
            .collect()
    }

    pub fn idle_count(&self) -> usize {
        self.lock()
            .events
            .iter()
            .filter(|e| matches!(e, SimEvent::ServoIdle))
            .count()
    }

    /// Indicator states written, in order.
    pub fn indicator_states(&self) -> Vec<bool> {
        self.lock()
            .events
            .iter()
            .filter_map(|e| match e {
                SimEvent::Indicator { on } => Some(*on),
                _ => None,
            })
            .collect()
    }

    /// The servo was released at some point, even if the event was evicted.
    pub fn servo_released(&self) -> bool {
        self.lock().servo_released
    }

    pub fn indicator_released(&self) -> bool {
        self.lock().indicator_released
    }

    /// Forget recorded events. Failure injection and release flags are kept.
    pub fn clear(&self) {
        self.lock().events.clear();
    }

    /// Make subsequent servo drives fail.
    pub fn fail_servo(&self, fail: bool) {
        self.lock().fail_servo = fail;
    }

    /// Make subsequent indicator writes fail.
    pub fn fail_indicator(&self, fail: bool) {
        self.lock().fail_indicator = fail;
    }
}

/// Simulated servo.
pub struct SimServo {
    trace: SimTrace,
}

impl SimServo {
    pub fn new(trace: SimTrace) -> Self {
        Self { trace }
    }
}

impl ServoOutput for SimServo {
    fn name(&self) -> &'static str {
        "sim"
    }

    fn drive(&mut self, duty_percent: f32) -> Result<()> {
        if self.trace.lock().fail_servo {
            return Err(anyhow!("simulated servo fault"));
        }
        log::trace!("sim servo -> {}", Angle::from_duty_percent(duty_percent));
        self.trace.record(SimEvent::ServoDrive { duty_percent });
        Ok(())
    }

    fn idle(&mut self) -> Result<()> {
        self.trace.record(SimEvent::ServoIdle);
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        self.trace.record(SimEvent::ServoRelease);
        Ok(())
    }
}

/// Simulated indicator.
pub struct SimIndicator {
    trace: SimTrace,
}

impl SimIndicator {
    pub fn new(trace: SimTrace) -> Self {
        Self { trace }
    }
}

impl IndicatorOutput for SimIndicator {
    fn name(&self) -> &'static str {
        "sim"
    }

    fn set(&mut self, on: bool) -> Result<()> {
        if self.trace.lock().fail_indicator {
            return Err(anyhow!("simulated indicator fault"));
        }
        self.trace.record(SimEvent::Indicator { on });
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        self.trace.record(SimEvent::IndicatorRelease);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_keeps_only_the_most_recent_events() -> Result<()> {
        let trace = SimTrace::with_capacity(8);
        let mut servo = SimServo::new(trace.clone());
        for step in 0..100u16 {
            servo.drive(Angle::new(f32::from(step % 180)).duty_percent())?;
        }

        assert_eq!(trace.capacity(), 8);
        assert_eq!(trace.events().len(), 8);
        assert_eq!(trace.evicted(), 92);
        let angles = trace.servo_angles();
        assert_eq!(angles.len(), 8);
        assert!((angles[7].degrees() - 99.0).abs() < 1e-3);
        Ok(())
    }

    #[test]
    fn release_is_remembered_after_eviction() -> Result<()> {
        let trace = SimTrace::with_capacity(2);
        let mut servo = SimServo::new(trace.clone());
        let mut led = SimIndicator::new(trace.clone());
        servo.release()?;
        led.release()?;
        for _ in 0..5 {
            led.set(true)?;
        }

        assert!(!trace.events().contains(&SimEvent::ServoRelease));
        assert!(trace.servo_released());
        assert!(trace.indicator_released());
        Ok(())
    }

    #[test]
    fn injected_faults_are_not_recorded() {
        let trace = SimTrace::new();
        let mut servo = SimServo::new(trace.clone());
        trace.fail_servo(true);
        assert!(servo.drive(7.0).is_err());
        assert!(trace.events().is_empty());
        assert_eq!(trace.capacity(), DEFAULT_TRACE_CAPACITY);
    }
}
