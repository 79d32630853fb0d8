//! Sort keys.

use crate::object::ScalarGetter;
use kite_schema::ScalarValue;
use std::cmp::Ordering;
use std::fmt;

/// One sort key.
pub struct SortCondition<T> {
    pub field: String,
    pub(crate) accessor: ScalarGetter<T>,
    pub descending: bool,
}

impl<T> Clone for SortCondition<T> {
    fn clone(&self) -> Self {
        Self {
            field: self.field.clone(),
            accessor: self.accessor.clone(),
            descending: self.descending,
        }
    }
}

impl<T> fmt::Debug for SortCondition<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let direction = if self.descending { "desc" } else { "asc" };
        write!(f, "{}_{direction}", self.field)
    }
}

impl<T> SortCondition<T> {
    pub(crate) fn new(field: impl Into<String>, accessor: ScalarGetter<T>, descending: bool) -> Self {
        Self {
            field: field.into(),
            accessor,
            descending,
        }
    }

    fn compare(&self, a: &T, b: &T) -> Ordering {
        let ordering = compare_values(&(self.accessor)(a), &(self.accessor)(b));
        if self.descending {
            ordering.reverse()
        } else {
            ordering
        }
    }
}

/// Nulls sort before values; unrelated kinds compare equal.
fn compare_values(a: &ScalarValue, b: &ScalarValue) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.compare(b).unwrap_or(Ordering::Equal),
    }
}

/// Sorts `items` by the keys in order. The sort is stable.
pub fn sort_items<T>(items: &mut [&T], conditions: &[SortCondition<T>]) {
    if conditions.is_empty() {
        return;
    }
    items.sort_by(|a, b| {
        conditions
            .iter()
            .map(|condition| condition.compare(a, b))
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct Row {
        group: &'static str,
        rank: Option<i64>,
    }

    #[test]
    fn test_multi_key_sort() {
        let rows = [
            Row { group: "b", rank: Some(1) },
            Row { group: "a", rank: Some(2) },
            Row { group: "b", rank: None },
            Row { group: "a", rank: Some(1) },
        ];
        let group = SortCondition::<Row>::new("group", Arc::new(|r: &Row| ScalarValue::from(r.group)), false);
        let rank = SortCondition::<Row>::new("rank", Arc::new(|r: &Row| ScalarValue::from(r.rank)), true);

        let mut items: Vec<&Row> = rows.iter().collect();
        sort_items(&mut items, &[group, rank]);

        let order: Vec<_> = items.iter().map(|r| (r.group, r.rank)).collect();
        assert_eq!(
            order,
            vec![("a", Some(2)), ("a", Some(1)), ("b", Some(1)), ("b", None)]
        );
    }
}
