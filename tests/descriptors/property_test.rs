/*!
 * Descriptor Table Property Tests
 * Random operation sequences checked against a model map
 */

use proptest::prelude::*;
use std::collections::BTreeMap;
use vfd_runtime::{DescriptorFlags, DescriptorKind, DescriptorTable, External, TableConfig, TableError};

const LIMIT: usize = 16;

#[derive(Debug, Clone)]
enum Op {
    Insert(i32),
    Close(i32),
    Dup(i32),
    Resolve(i32),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (100..200i32).prop_map(Op::Insert),
        (0..LIMIT as i32).prop_map(Op::Close),
        (0..LIMIT as i32).prop_map(Op::Dup),
        (-2..LIMIT as i32 + 2).prop_map(Op::Resolve),
    ]
}

proptest! {
    #[test]
    fn never_inserted_ids_are_not_found(fd in any::<i32>()) {
        let table = DescriptorTable::new(TableConfig::bare(LIMIT));
        prop_assert!(!table.resolve(fd).is_found());
    }

    #[test]
    fn table_matches_model(ops in prop::collection::vec(op(), 1..200)) {
        let table = DescriptorTable::new(TableConfig::bare(LIMIT));
        let mut model: BTreeMap<i32, i32> = BTreeMap::new();

        for op in ops {
            match op {
                Op::Insert(os_fd) => {
                    let result = table.insert(External::Os(os_fd), DescriptorKind::RegularFile, DescriptorFlags::empty());
                    if model.len() == LIMIT {
                        prop_assert_eq!(result, Err(TableError::Exhausted { limit: LIMIT }));
                    } else {
                        let expected = (0..).find(|fd: &i32| !model.contains_key(fd)).unwrap();
                        prop_assert_eq!(result, Ok(expected));
                        model.insert(expected, os_fd);
                    }
                }
                Op::Close(fd) => {
                    let result = table.close(fd, |_| -> Result<(), TableError> { Ok(()) });
                    if model.remove(&fd).is_some() {
                        prop_assert_eq!(result, Ok(()));
                    } else {
                        prop_assert_eq!(result, Err(TableError::BadDescriptor(fd)));
                    }
                }
                Op::Dup(fd) => {
                    let result = table.duplicate(fd, DescriptorFlags::empty());
                    match model.get(&fd).copied() {
                        Some(os_fd) if model.len() < LIMIT => {
                            let expected = (0..).find(|fd: &i32| !model.contains_key(fd)).unwrap();
                            prop_assert_eq!(result, Ok(expected));
                            model.insert(expected, os_fd);
                        }
                        Some(_) => prop_assert_eq!(result, Err(TableError::Exhausted { limit: LIMIT })),
                        None => prop_assert_eq!(result, Err(TableError::BadDescriptor(fd))),
                    }
                }
                Op::Resolve(fd) => {
                    let expected = model.get(&fd).map(|os_fd| External::Os(*os_fd));
                    prop_assert_eq!(table.resolve(fd).external(), expected);
                }
            }
        }

        prop_assert_eq!(table.len(), model.len());
    }
}
