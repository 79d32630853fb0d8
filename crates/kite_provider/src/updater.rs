//! Partial updates from mutation input.
//!
//! A [`Patch`] pairs a value built from an input object with the list of
//! input keys that were actually supplied. Applying the patch copies only
//! those fields, using the copier compiled for each settable field.

use crate::error::ResolverError;
use crate::object::{metadata, ApiObject, ScalarGetter};
use kite_schema::{ScalarType, ScalarValue};
use serde_json::Value;
use std::sync::Arc;

pub(crate) type ScalarSetter<T> = Arc<dyn Fn(&mut T, ScalarValue) + Send + Sync>;
type NestedBuild<T> = Arc<dyn Fn(&mut T, &Value) -> Result<Vec<PatchField>, ResolverError> + Send + Sync>;
type NestedCopy<T> = Arc<dyn Fn(&mut T, &T, &[PatchField]) + Send + Sync>;

/// How one settable field is read from input and copied between values.
pub(crate) enum Copier<T> {
    Scalar {
        scalar_type: ScalarType,
        read: ScalarGetter<T>,
        write: ScalarSetter<T>,
    },
    Nested {
        build: NestedBuild<T>,
        copy: NestedCopy<T>,
    },
}

impl<T: ApiObject> Copier<T> {
    pub(crate) fn nested<U, G, M>(get: Arc<G>, get_mut: Arc<M>) -> Self
    where
        U: ApiObject + Default,
        G: Fn(&T) -> &U + Send + Sync + 'static,
        M: Fn(&mut T) -> &mut U + Send + Sync + 'static,
    {
        let target = Arc::clone(&get_mut);
        Copier::Nested {
            build: Arc::new(move |object: &mut T, input: &Value| -> Result<Vec<PatchField>, ResolverError> {
                let (value, provided) = Patch::<U>::from_input(input)?.into_parts();
                *target(object) = value;
                Ok(provided)
            }),
            copy: Arc::new(move |object: &mut T, source: &T, fields: &[PatchField]| {
                copy_fields(get_mut(object), get(source), fields);
            }),
        }
    }
}

/// A supplied input key, with the keys supplied below it for nested objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchField {
    pub name: String,
    pub nested: Vec<PatchField>,
}

impl PatchField {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nested: Vec::new(),
        }
    }
}

/// A value plus the fields of it that were supplied.
#[derive(Debug, Clone)]
pub struct Patch<T> {
    value: T,
    provided: Vec<PatchField>,
}

impl<T: ApiObject> Patch<T> {
    pub fn new(value: T, provided: Vec<PatchField>) -> Self {
        Self { value, provided }
    }

    /// Builds a patch from a mutation input object.
    ///
    /// Keys that are unknown or not settable are ignored. A scalar literal
    /// that does not fit its field is an error.
    pub fn from_input(input: &Value) -> Result<Self, ResolverError>
    where
        T: Default,
    {
        let Some(map) = input.as_object() else {
            return Err(ResolverError::invalid_argument(
                T::TYPE_NAME,
                "expected an input object",
            ));
        };

        let metadata = metadata::<T>();
        let mut value = T::default();
        let mut provided = Vec::new();

        for (name, json) in map {
            let Some(copier) = metadata.binding(name).and_then(|b| b.copier.as_ref()) else {
                continue;
            };
            match copier {
                Copier::Scalar {
                    scalar_type, write, ..
                } => {
                    let scalar = ScalarValue::from_json(*scalar_type, json).ok_or_else(|| {
                        ResolverError::invalid_argument(
                            name.as_str(),
                            format!("expected {}", scalar_type.graph_name()),
                        )
                    })?;
                    write(&mut value, scalar);
                    provided.push(PatchField::new(name.as_str()));
                }
                Copier::Nested { build, .. } => {
                    if json.is_null() {
                        continue;
                    }
                    let nested = build(&mut value, json)?;
                    provided.push(PatchField {
                        name: name.clone(),
                        nested,
                    });
                }
            }
        }

        Ok(Self { value, provided })
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn provided(&self) -> &[PatchField] {
        &self.provided
    }

    /// Returns true if the top-level input supplied `name`.
    pub fn is_provided(&self, name: &str) -> bool {
        self.provided.iter().any(|f| f.name == name)
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn into_parts(self) -> (T, Vec<PatchField>) {
        (self.value, self.provided)
    }

    /// Copies the supplied fields onto `target`.
    pub fn apply_to(&self, target: &mut T) {
        copy_fields(target, &self.value, &self.provided);
    }
}

fn copy_fields<T: ApiObject>(target: &mut T, source: &T, fields: &[PatchField]) {
    let metadata = metadata::<T>();
    for field in fields {
        match metadata.binding(&field.name).and_then(|b| b.copier.as_ref()) {
            Some(Copier::Scalar { read, write, .. }) => write(target, read(source)),
            Some(Copier::Nested { copy, .. }) => copy(target, source, &field.nested),
            None => {}
        }
    }
}
