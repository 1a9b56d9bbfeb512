//! WHERE-clause evaluation for keystone
//!
//! A WHERE clause is a flat list of comparisons joined by a flat list of
//! connectives (AND, OR, NOT). Connectives apply left-to-right with no
//! precedence; a leading NOT negates the first comparison, and a NOT after
//! AND/OR negates the right-hand comparison of that join. This is part of
//! the query language's contract, not an evaluation shortcut.

use crate::sql::ast::{CompareOp, Condition, Connective};
use crate::storage::value::Record;
use std::cmp::Ordering;

/// Evaluate one comparison against a record.
///
/// A missing column, a value of a different tag, or an operator without
/// defined semantics on the tag (including LIKE) all evaluate to false.
pub fn matches_condition(record: &Record, condition: &Condition) -> bool {
    let Some(field) = record.get(&condition.column) else {
        return false;
    };

    match condition.op {
        CompareOp::Eq => field == &condition.value,
        CompareOp::NotEq => {
            // inequality still requires comparable tags
            field.type_name() == condition.value.type_name() && field != &condition.value
        }
        CompareOp::Gt => field.compare(&condition.value) == Some(Ordering::Greater),
        CompareOp::Lt => field.compare(&condition.value) == Some(Ordering::Less),
        CompareOp::GtEq => matches!(
            field.compare(&condition.value),
            Some(Ordering::Greater) | Some(Ordering::Equal)
        ),
        CompareOp::LtEq => matches!(
            field.compare(&condition.value),
            Some(Ordering::Less) | Some(Ordering::Equal)
        ),
        CompareOp::Like => false,
    }
}

/// Evaluate a full WHERE clause against a record.
///
/// An empty condition list matches everything.
pub fn matches(record: &Record, conditions: &[Condition], connectives: &[Connective]) -> bool {
    let Some(first) = conditions.first() else {
        return true;
    };

    let mut result = matches_condition(record, first);
    let mut next_connective = 0;
    if connectives.first() == Some(&Connective::Not) {
        result = !result;
        next_connective = 1;
    }

    for condition in &conditions[1..] {
        // absent join connective defaults to AND; the parser's operator
        // count check keeps this from happening on well-formed input
        let join = connectives
            .get(next_connective)
            .copied()
            .unwrap_or(Connective::And);
        next_connective += 1;

        let mut rhs = matches_condition(record, condition);
        if connectives.get(next_connective) == Some(&Connective::Not) {
            rhs = !rhs;
            next_connective += 1;
        }

        result = match join {
            Connective::And => result && rhs,
            Connective::Or => result || rhs,
            // NOT in joining position negates the right-hand side
            Connective::Not => result && !rhs,
        };
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::value::FieldValue;

    fn record() -> Record {
        let mut r = Record::new();
        r.insert("id".to_string(), FieldValue::Int(5));
        r.insert("name".to_string(), FieldValue::Str("Ann".to_string()));
        r.insert("score".to_string(), FieldValue::Float(1.5));
        r.insert("active".to_string(), FieldValue::Bool(true));
        r
    }

    fn cond(column: &str, op: CompareOp, value: FieldValue) -> Condition {
        Condition {
            column: column.to_string(),
            op,
            value,
        }
    }

    #[test]
    fn test_single_comparisons() {
        let r = record();
        assert!(matches_condition(&r, &cond("id", CompareOp::Eq, FieldValue::Int(5))));
        assert!(matches_condition(&r, &cond("id", CompareOp::Gt, FieldValue::Int(4))));
        assert!(matches_condition(&r, &cond("id", CompareOp::LtEq, FieldValue::Int(5))));
        assert!(matches_condition(&r, &cond("name", CompareOp::NotEq, FieldValue::Str("Bo".to_string()))));
        assert!(!matches_condition(&r, &cond("id", CompareOp::Lt, FieldValue::Int(5))));
    }

    #[test]
    fn test_missing_column_is_false() {
        let r = record();
        assert!(!matches_condition(&r, &cond("ghost", CompareOp::Eq, FieldValue::Int(5))));
    }

    #[test]
    fn test_cross_tag_is_false() {
        let r = record();
        assert!(!matches_condition(&r, &cond("id", CompareOp::Eq, FieldValue::Str("5".to_string()))));
        assert!(!matches_condition(&r, &cond("id", CompareOp::Gt, FieldValue::Float(1.0))));
        // even != is false across tags
        assert!(!matches_condition(&r, &cond("id", CompareOp::NotEq, FieldValue::Str("x".to_string()))));
    }

    #[test]
    fn test_like_never_matches() {
        let r = record();
        assert!(!matches_condition(&r, &cond("name", CompareOp::Like, FieldValue::Str("A%".to_string()))));
    }

    #[test]
    fn test_and_or_fold_left_to_right() {
        let r = record();
        let conds = [
            cond("id", CompareOp::Eq, FieldValue::Int(5)),
            cond("name", CompareOp::Eq, FieldValue::Str("Bo".to_string())),
            cond("active", CompareOp::Eq, FieldValue::Bool(true)),
        ];

        // (true AND false) OR true = true
        assert!(matches(&r, &conds, &[Connective::And, Connective::Or]));
        // (true OR false) AND true = true
        assert!(matches(&r, &conds, &[Connective::Or, Connective::And]));
        // (true AND false) AND true = false
        assert!(!matches(&r, &conds, &[Connective::And, Connective::And]));
    }

    #[test]
    fn test_leading_not() {
        let r = record();
        let conds = [cond("id", CompareOp::Eq, FieldValue::Int(5))];
        assert!(!matches(&r, &conds, &[Connective::Not]));

        let conds = [cond("id", CompareOp::Eq, FieldValue::Int(99))];
        assert!(matches(&r, &conds, &[Connective::Not]));
    }

    #[test]
    fn test_not_negates_right_hand_side() {
        let r = record();
        let conds = [
            cond("id", CompareOp::Eq, FieldValue::Int(5)),
            cond("name", CompareOp::Eq, FieldValue::Str("Bo".to_string())),
        ];
        // true AND (NOT false) = true
        assert!(matches(&r, &conds, &[Connective::And, Connective::Not]));
    }

    #[test]
    fn test_empty_where_matches_everything() {
        assert!(matches(&record(), &[], &[]));
    }
}
