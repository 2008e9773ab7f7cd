//! Primary-contact tracking over multitouch slot events.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TouchPhase {
    Start,
    Move,
    End,
}

impl TouchPhase {
    pub const ALL: [TouchPhase; 3] = [TouchPhase::Start, TouchPhase::Move, TouchPhase::End];
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TouchEvent {
    pub phase: TouchPhase,
    pub y: f32,
}

impl TouchEvent {
    pub fn start(y: f32) -> Self {
        Self {
            phase: TouchPhase::Start,
            y,
        }
    }

    pub fn moved(y: f32) -> Self {
        Self {
            phase: TouchPhase::Move,
            y,
        }
    }

    pub fn end(y: f32) -> Self {
        Self {
            phase: TouchPhase::End,
            y,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct SlotState {
    tracking_id: i32, // -1 = inactive
    y_px: f32,
    seen_y: bool,
    active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Primary {
    slot: usize,
    reported_y: Option<f32>,
}

#[derive(Debug)]
pub struct ContactTracker {
    slots: Vec<SlotState>,
    cur_slot: usize,
    y_min: i32,
    y_max: i32,
    height_px: f32,
    primary: Option<Primary>,
}

impl ContactTracker {
    pub fn new(height_px: u32) -> Self {
        Self {
            slots: vec![SlotState::default(); 10],
            cur_slot: 0,
            y_min: 0,
            y_max: 4096,
            height_px: height_px as f32,
            primary: None,
        }
    }

    pub fn set_y_range(&mut self, y_min: i32, y_max: i32) {
        self.y_min = y_min;
        self.y_max = y_max.max(y_min + 1);
    }

    pub fn on_slot(&mut self, slot: i32) {
        self.cur_slot = slot.clamp(0, self.slots.len() as i32 - 1) as usize;
    }

    pub fn on_tracking_id(&mut self, tracking_id: i32) {
        let s = &mut self.slots[self.cur_slot];
        if tracking_id < 0 {
            s.tracking_id = -1;
            s.active = false;
        } else {
            *s = SlotState {
                tracking_id,
                y_px: s.y_px,
                seen_y: false,
                active: true,
            };
        }
    }

    pub fn on_pos_y(&mut self, raw: i32) {
        let ny = ((raw - self.y_min) as f32 / (self.y_max - self.y_min) as f32).clamp(0.0, 1.0);
        let s = &mut self.slots[self.cur_slot];
        s.y_px = ny * self.height_px;
        s.seen_y = true;
    }

    /// Closes a frame and reports what the primary contact did in it.
    pub fn on_syn_report(&mut self) -> Option<TouchEvent> {
        match self.primary {
            Some(p) => {
                let s = &self.slots[p.slot];
                if !s.active {
                    self.primary = None;
                    return p.reported_y.map(TouchEvent::end);
                }
                if !s.seen_y {
                    return None;
                }
                let y = s.y_px;
                match p.reported_y {
                    None => {
                        self.primary = Some(Primary {
                            reported_y: Some(y),
                            ..p
                        });
                        Some(TouchEvent::start(y))
                    }
                    Some(prev) if prev != y => {
                        self.primary = Some(Primary {
                            reported_y: Some(y),
                            ..p
                        });
                        Some(TouchEvent::moved(y))
                    }
                    Some(_) => None,
                }
            }
            None => {
                let slot = self.slots.iter().position(|s| s.active && s.tracking_id >= 0)?;
                let s = &self.slots[slot];
                if !s.seen_y {
                    self.primary = Some(Primary {
                        slot,
                        reported_y: None,
                    });
                    return None;
                }
                self.primary = Some(Primary {
                    slot,
                    reported_y: Some(s.y_px),
                });
                Some(TouchEvent::start(s.y_px))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> ContactTracker {
        let mut t = ContactTracker::new(1000);
        t.set_y_range(0, 1000);
        t
    }

    #[test]
    fn single_contact_start_move_end() {
        let mut t = tracker();
        t.on_slot(0);
        t.on_tracking_id(7);
        t.on_pos_y(200);
        assert_eq!(t.on_syn_report(), Some(TouchEvent::start(200.0)));

        t.on_pos_y(320);
        assert_eq!(t.on_syn_report(), Some(TouchEvent::moved(320.0)));

        // unchanged y produces nothing
        assert_eq!(t.on_syn_report(), None);

        t.on_tracking_id(-1);
        assert_eq!(t.on_syn_report(), Some(TouchEvent::end(320.0)));
        assert_eq!(t.on_syn_report(), None);
    }

    #[test]
    fn second_finger_is_ignored() {
        let mut t = tracker();
        t.on_slot(0);
        t.on_tracking_id(1);
        t.on_pos_y(100);
        assert_eq!(t.on_syn_report(), Some(TouchEvent::start(100.0)));

        t.on_slot(1);
        t.on_tracking_id(2);
        t.on_pos_y(900);
        assert_eq!(t.on_syn_report(), None);

        t.on_slot(0);
        t.on_pos_y(150);
        assert_eq!(t.on_syn_report(), Some(TouchEvent::moved(150.0)));
    }

    #[test]
    fn raw_range_maps_to_pixels() {
        let mut t = ContactTracker::new(800);
        t.set_y_range(100, 500);
        t.on_tracking_id(3);
        t.on_pos_y(300);
        assert_eq!(t.on_syn_report(), Some(TouchEvent::start(400.0)));
        t.on_pos_y(9000);
        assert_eq!(t.on_syn_report(), Some(TouchEvent::moved(800.0)));
    }

    #[test]
    fn each_device_keeps_its_own_slots() {
        let mut panel = tracker();
        let mut pad = tracker();

        panel.on_slot(0);
        panel.on_tracking_id(1);
        panel.on_pos_y(100);
        assert_eq!(panel.on_syn_report(), Some(TouchEvent::start(100.0)));

        // slot 0 on the second device is a different finger
        pad.on_slot(0);
        pad.on_tracking_id(9);
        pad.on_pos_y(700);
        assert_eq!(pad.on_syn_report(), Some(TouchEvent::start(700.0)));
        pad.on_tracking_id(-1);
        assert_eq!(pad.on_syn_report(), Some(TouchEvent::end(700.0)));

        assert_eq!(panel.on_syn_report(), None);
        panel.on_pos_y(180);
        assert_eq!(panel.on_syn_report(), Some(TouchEvent::moved(180.0)));
    }

    #[test]
    fn start_waits_for_position() {
        let mut t = tracker();
        t.on_tracking_id(4);
        assert_eq!(t.on_syn_report(), None);
        t.on_pos_y(50);
        assert_eq!(t.on_syn_report(), Some(TouchEvent::start(50.0)));
    }
}
