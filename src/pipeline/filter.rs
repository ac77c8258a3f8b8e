use crate::model::Sample;

/// Whether `new_sample` is worth persisting given the last accepted sample.
///
/// Values are compared exactly; any difference at all is novel. A label
/// missing from `last_sample` also counts as a change.
pub fn is_novel(new_sample: &Sample, last_sample: Option<&Sample>) -> bool {
    let Some(last) = last_sample else {
        return true;
    };

    new_sample
        .values()
        .iter()
        .any(|(label, value)| last.value(label) != Some(*value))
}
