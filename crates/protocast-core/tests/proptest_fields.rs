//! Property-based tests for field numbering
//!
//! Field numbers identify fields on the wire, so a message with a repeated
//! number must never compile, and synthesized map entries always use 1 and 2.

use proptest::prelude::*;
use protocast_core::classify::{MAP_KEY_NUMBER, MAP_VALUE_NUMBER};
use protocast_core::schema::{Field, Message, ScalarType, SchemaFile};
use protocast_core::{Compiler, Error, MAX_FIELD_NUMBER};
use std::collections::HashSet;

// Strategy: Field numbers from the valid range, small values more likely
fn arb_field_number() -> impl Strategy<Value = u32> {
    prop_oneof![
        3 => 1u32..64,
        1 => 1u32..=MAX_FIELD_NUMBER,
    ]
}

// Strategy: Scalar types usable as map keys
fn arb_map_key() -> impl Strategy<Value = ScalarType> {
    prop::sample::select(
        ScalarType::ALL
            .into_iter()
            .filter(|s| s.is_valid_map_key())
            .collect::<Vec<_>>(),
    )
}

fn message_with_numbers(numbers: &[u32]) -> Vec<SchemaFile> {
    let mut message = Message::new("Sample");
    for (i, &number) in numbers.iter().enumerate() {
        message = message.field(Field::new(format!("f{}", i), "int64", number));
    }
    vec![SchemaFile::new("sample.proto").message(message)]
}

proptest! {
    /// Property: a message compiles exactly when its field numbers are unique
    #[test]
    fn proptest_duplicate_numbers_rejected(
        numbers in prop::collection::vec(arb_field_number(), 1..24)
    ) {
        let unique: HashSet<u32> = numbers.iter().copied().collect();
        let result = Compiler::new().compile(&message_with_numbers(&numbers));

        if unique.len() == numbers.len() {
            let compiled = result.expect("unique numbers should compile");
            let got: Vec<u32> = compiled[0].messages[0].fields.iter().map(|f| f.number).collect();
            prop_assert_eq!(got, numbers);
        } else {
            let is_duplicate = matches!(result, Err(Error::DuplicateFieldNumber { .. }));
            prop_assert!(is_duplicate);
        }
    }

    /// Property: forcing a collision always reports both field names
    #[test]
    fn proptest_forced_collision_names_fields(
        numbers in prop::collection::hash_set(arb_field_number(), 1..16),
        pick in any::<prop::sample::Index>()
    ) {
        let mut numbers: Vec<u32> = numbers.into_iter().collect();
        let repeated = numbers[pick.index(numbers.len())];
        numbers.push(repeated);

        match Compiler::new().compile(&message_with_numbers(&numbers)) {
            Err(Error::DuplicateFieldNumber { message, number, second, .. }) => {
                prop_assert_eq!(message, ".Sample");
                prop_assert_eq!(number, repeated);
                prop_assert_eq!(second, format!("f{}", numbers.len() - 1));
            }
            other => prop_assert!(false, "expected duplicate number, got {:?}", other.map(|_| ())),
        }
    }

    /// Property: map entries always number key 1 and value 2
    #[test]
    fn proptest_map_entry_numbers(
        key in arb_map_key(),
        number in arb_field_number(),
        by_message in any::<bool>()
    ) {
        let value = if by_message { "Value" } else { "bytes" };
        let files = vec![SchemaFile::new("maps.proto")
            .message(Message::new("Value"))
            .message(Message::new("Holder").field(Field::map("entries", key, value, number)))];

        let compiled = Compiler::new().compile(&files).expect("valid map should compile");
        let field = &compiled[0].messages[1].fields[0];
        let entry = field.map_entry().expect("map field has an entry");

        prop_assert_eq!(field.number, number);
        prop_assert_eq!(entry.key.number, MAP_KEY_NUMBER);
        prop_assert_eq!(entry.value.number, MAP_VALUE_NUMBER);
        prop_assert_eq!(&entry.full_name, ".Holder.EntriesEntry");
    }
}
