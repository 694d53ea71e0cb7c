use super::Location;
use std::collections::HashMap;
use tracing::debug;

/// What reaching a breakpoint asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Hit {
    Stop,
    /// Stop only if this R condition is `TRUE` at the pause.
    StopIf(String),
}

#[derive(Debug, Default)]
pub struct Breakpoints {
    points: HashMap<Location, Option<String>>,
    temporary: Option<Location>,
}

impl Breakpoints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, location: Location) {
        self.insert(location, None);
    }

    pub fn add_conditional(&mut self, location: Location, condition: impl Into<String>) {
        self.insert(location, Some(condition.into()));
    }

    fn insert(&mut self, location: Location, condition: Option<String>) {
        debug!(%location, ?condition, "breakpoint set");
        self.points.insert(location, condition);
    }

    pub fn remove(&mut self, location: &Location) {
        if self.points.remove(location).is_some() {
            debug!(%location, "breakpoint removed");
        }
    }

    pub fn contains(&self, location: &Location) -> bool {
        self.points.contains_key(location)
    }

    /// Swaps every breakpoint of one function for the given lines and their conditions.
    pub fn replace_lines(&mut self, function_name: &str, lines: &[(i32, Option<String>)]) {
        self.points.retain(|p, _| p.function_name != function_name);
        for (line, condition) in lines {
            self.insert(Location::new(function_name, *line), condition.clone());
        }
    }

    /// One-shot breakpoint used by run-to-position.
    pub fn set_temporary(&mut self, location: Location) {
        self.temporary = Some(location);
    }

    /// A matching temporary breakpoint is consumed and always stops.
    pub fn hit(&mut self, location: &Location) -> Option<Hit> {
        if self.temporary.as_ref() == Some(location) {
            self.temporary = None;
            return Some(Hit::Stop);
        }
        self.points.get(location).map(|condition| match condition {
            Some(condition) => Hit::StopIf(condition.clone()),
            None => Hit::Stop,
        })
    }

    pub fn clear_temporary(&mut self) {
        self.temporary = None;
    }

    pub fn clear(&mut self) {
        self.points.clear();
        self.temporary = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temporary_breakpoint_fires_once() {
        let mut breakpoints = Breakpoints::new();
        let target = Location::main(4);
        breakpoints.set_temporary(target.clone());

        assert_eq!(breakpoints.hit(&target), Some(Hit::Stop));
        assert_eq!(breakpoints.hit(&target), None);
    }

    #[test]
    fn conditions_travel_with_the_hit() {
        let mut breakpoints = Breakpoints::new();
        breakpoints.add_conditional(Location::new("f", 3), "x > 2");

        assert_eq!(
            breakpoints.hit(&Location::new("f", 3)),
            Some(Hit::StopIf("x > 2".to_string()))
        );
        breakpoints.add(Location::new("f", 3));
        assert_eq!(breakpoints.hit(&Location::new("f", 3)), Some(Hit::Stop));
    }

    #[test]
    fn replacing_lines_keeps_other_functions() {
        let mut breakpoints = Breakpoints::new();
        breakpoints.add(Location::new("f", 2));
        breakpoints.add(Location::main(1));
        breakpoints.replace_lines("<main>", &[(3, None), (5, Some("i == 2".to_string()))]);

        assert!(breakpoints.contains(&Location::new("f", 2)));
        assert!(!breakpoints.contains(&Location::main(1)));
        assert_eq!(
            breakpoints.hit(&Location::main(5)),
            Some(Hit::StopIf("i == 2".to_string()))
        );
    }
}
