//! Parameter automation with WebAudio `AudioParam` timing semantics.
//!
//! A ramp runs from the time and value of the event before it to its own
//! time and value. Before the first event the parameter sits at its initial
//! value; after the last event it holds the last value.

/// Values at or below this are treated as silent by exponential ramps.
pub const SILENCE_FLOOR: f64 = 0.0001;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RampKind {
    /// Jump at `time`.
    Set,
    Linear,
    Exponential,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutomationEvent {
    pub kind: RampKind,
    pub time: f64,
    pub value: f64,
}

/// A scheduled parameter curve over absolute session time in seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct Automation {
    initial: f64,
    events: Vec<AutomationEvent>,
}

impl Automation {
    pub fn new(initial: f64) -> Self {
        Automation {
            initial,
            events: Vec::new(),
        }
    }

    /// Constant parameter.
    pub fn constant(value: f64) -> Self {
        Self::new(value)
    }

    pub fn set_value_at(mut self, value: f64, time: f64) -> Self {
        self.push(RampKind::Set, value, time);
        self
    }

    pub fn linear_ramp_to(mut self, value: f64, time: f64) -> Self {
        self.push(RampKind::Linear, value, time);
        self
    }

    pub fn exponential_ramp_to(mut self, value: f64, time: f64) -> Self {
        self.push(RampKind::Exponential, value, time);
        self
    }

    fn push(&mut self, kind: RampKind, value: f64, time: f64) {
        let event = AutomationEvent { kind, time, value };
        // Keep events ordered; equal times keep insertion order.
        let at = self.events.partition_point(|e| e.time <= time);
        self.events.insert(at, event);
    }

    pub fn events(&self) -> &[AutomationEvent] {
        &self.events
    }

    /// Time of the last scheduled event, if any.
    pub fn end_time(&self) -> Option<f64> {
        self.events.last().map(|e| e.time)
    }

    pub fn value_at(&self, t: f64) -> f64 {
        let mut prev: Option<(f64, f64)> = None;
        let mut current = self.initial;

        for event in &self.events {
            if t < event.time {
                let Some((t0, v0)) = prev else {
                    return current;
                };
                let span = event.time - t0;
                if span <= 0.0 {
                    return current;
                }
                let x = (t - t0) / span;
                return match event.kind {
                    RampKind::Set => current,
                    RampKind::Linear => v0 + (event.value - v0) * x,
                    RampKind::Exponential => {
                        // Undefined across zero or a sign change; hold instead.
                        if v0 == 0.0 || v0 * event.value <= 0.0 {
                            current
                        } else {
                            v0 * (event.value / v0).powf(x)
                        }
                    }
                };
            }
            prev = Some((event.time, event.value));
            current = event.value;
        }
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn holds_initial_before_first_event() {
        let a = Automation::new(440.0)
            .set_value_at(560.0, 1.02)
            .exponential_ramp_to(300.0, 2.0);
        assert_eq!(a.value_at(0.0), 440.0);
        assert_eq!(a.value_at(1.01), 440.0);
        assert_eq!(a.value_at(1.02), 560.0);
        assert_eq!(a.value_at(5.0), 300.0);
    }

    #[test]
    fn linear_ramp_interpolates() {
        let a = Automation::new(1.0)
            .set_value_at(0.0, 0.0)
            .linear_ramp_to(1.0, 2.0);
        assert_relative_eq!(a.value_at(0.5), 0.25);
        assert_relative_eq!(a.value_at(1.0), 0.5);
        assert_eq!(a.value_at(2.0), 1.0);
    }

    #[test]
    fn exponential_ramp_is_geometric() {
        let a = Automation::new(1.0)
            .set_value_at(980.0, 10.0)
            .exponential_ramp_to(410.0, 10.2);
        let mid = a.value_at(10.1);
        assert_relative_eq!(mid, (980.0_f64 * 410.0).sqrt(), max_relative = 1e-9);
    }

    #[test]
    fn envelope_shape_attack_then_decay() {
        let a = Automation::new(1.0)
            .set_value_at(SILENCE_FLOOR, 0.0)
            .linear_ramp_to(0.3, 0.01)
            .exponential_ramp_to(SILENCE_FLOOR, 0.32);
        assert_relative_eq!(a.value_at(0.005), (SILENCE_FLOOR + 0.3) / 2.0);
        assert_eq!(a.value_at(0.01), 0.3);
        assert!(a.value_at(0.2) < 0.3 && a.value_at(0.2) > SILENCE_FLOOR);
        assert_eq!(a.value_at(0.5), SILENCE_FLOOR);
        assert_eq!(a.end_time(), Some(0.32));
    }

    #[test]
    fn events_stay_sorted() {
        let a = Automation::new(0.0)
            .linear_ramp_to(1.0, 2.0)
            .set_value_at(0.5, 1.0);
        let times: Vec<_> = a.events().iter().map(|e| e.time).collect();
        assert_eq!(times, vec![1.0, 2.0]);
    }

    #[test]
    fn exponential_ramp_through_zero_holds() {
        let a = Automation::new(0.0)
            .set_value_at(0.0, 0.0)
            .exponential_ramp_to(1.0, 1.0);
        assert_eq!(a.value_at(0.5), 0.0);
    }
}
