//! The Compare archive: structural equality and ordering. Generated
//! structs/unions derive `PartialEq`/`Eq`/`PartialOrd`/`Ord` field-wise in
//! declaration order (discriminant first for unions), so this module is a
//! thin, explicitly named entry point rather than a second traversal.

use std::cmp::Ordering;

pub fn equal<T: PartialEq>(a: &T, b: &T) -> bool {
    a == b
}

pub fn compare<T: Ord>(a: &T, b: &T) -> Ordering {
    a.cmp(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Shaped the way the code generator emits a `union switch (int d) {
    /// case 1: int i; case 2: string s<16>; }` — a tagged-sum enum
    /// deriving `Ord` because every arm's payload is orderable.
    #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
    enum GeneratedUnion {
        I(i32),
        S(String),
    }

    #[test]
    fn compare_orders_a_generated_union_by_variant_then_payload() {
        let a = GeneratedUnion::I(1);
        let b = GeneratedUnion::I(2);
        assert_eq!(compare(&a, &b), Ordering::Less);
        assert_eq!(compare(&b, &a), Ordering::Greater);
        assert_eq!(compare(&a, &a), Ordering::Equal);

        let s = GeneratedUnion::S("x".to_string());
        assert_eq!(compare(&b, &s), Ordering::Less);
    }

    #[test]
    fn equal_uses_structural_equality() {
        let a = GeneratedUnion::S("same".to_string());
        let b = GeneratedUnion::S("same".to_string());
        assert!(equal(&a, &b));
        assert!(!equal(&a, &GeneratedUnion::S("different".to_string())));
    }
}
