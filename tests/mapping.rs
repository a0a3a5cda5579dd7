use prosemirror_core::markdown::helper::{doc, node, p};
use prosemirror_core::model::{Fragment, Slice};
use prosemirror_core::transform::{Assoc, Mappable, Mapping, ReplaceStep, StepKind};
use proptest::prelude::*;

const TEXT: &str = "hello world";

fn replacement() -> impl Strategy<Value = (usize, usize, String)> {
    (1usize..=TEXT.len() + 1, 0usize..=TEXT.len(), "[a-z]{0,4}").prop_map(|(a, len, insert)| {
        let to = (a + len).min(TEXT.len() + 1);
        (a, to, insert)
    })
}

fn step_for(from: usize, to: usize, insert: &str) -> ReplaceStep {
    let slice = if insert.is_empty() {
        Slice::empty()
    } else {
        Slice::new(Fragment::from(node(insert)), 0, 0)
    };
    ReplaceStep::new(from, to, slice, false)
}

proptest! {
    #[test]
    fn inverted_steps_restore_the_document((from, to, insert) in replacement()) {
        let start = doc(p(TEXT));
        let step = step_for(from, to, &insert);
        let changed = step.apply(&start).unwrap();
        let inverse = step.invert(&start).unwrap();
        prop_assert_eq!(inverse.apply(&changed).unwrap(), start);
    }

    #[test]
    fn positions_outside_the_change_map_back((from, to, insert) in replacement()) {
        let map = step_for(from, to, &insert).get_map();
        let inverted = map.invert();
        for pos in (0..from).chain(to + 1..=TEXT.len() + 2) {
            for assoc in [Assoc::Before, Assoc::After] {
                prop_assert_eq!(inverted.map(map.map(pos, assoc), assoc), pos);
            }
        }
    }

    #[test]
    fn mirrored_maps_recover_every_position((from, to, insert) in replacement()) {
        let map = step_for(from, to, &insert).get_map();
        let mut mapping = Mapping::new();
        mapping.append_map(map.clone(), None);
        mapping.append_map(map.invert(), Some(0));
        for pos in 0..=TEXT.len() + 2 {
            prop_assert_eq!(mapping.map(pos, Assoc::After), pos);
        }
    }
}
