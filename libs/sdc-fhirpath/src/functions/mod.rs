//! Function registry for FHIRPath functions
//!
//! Maps function names to a [`FunctionKind`] plus arity metadata using a
//! compile-time perfect hash map. Functions whose arguments are expressions
//! evaluated per item (`where`, `select`, ...) or type specifiers (`ofType`)
//! are run by the evaluator; everything else receives its input collection and
//! already evaluated argument collections through [`call`].

pub mod aggregate;
pub mod combining;
pub mod conversion;
pub mod datetime;
pub mod existence;
pub mod math;
pub mod navigation;
pub mod string;
pub mod subsetting;
pub mod utility;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::value::{Collection, Value};
use phf::phf_map;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    // existence
    Empty,
    Exists,
    All,
    AllTrue,
    AnyTrue,
    AllFalse,
    AnyFalse,
    SubsetOf,
    SupersetOf,
    Count,
    Distinct,
    IsDistinct,
    HasValue,
    // filtering and projection
    Where,
    Select,
    Repeat,
    OfType,
    // subsetting
    Single,
    First,
    Last,
    Tail,
    Skip,
    Take,
    Intersect,
    Exclude,
    // combining
    Union,
    Combine,
    // boolean and types
    Not,
    Iif,
    Is,
    As,
    // navigation
    Children,
    Descendants,
    Extension,
    // conversion
    ToBoolean,
    ConvertsToBoolean,
    ToInteger,
    ConvertsToInteger,
    ToDecimal,
    ConvertsToDecimal,
    ToString,
    ConvertsToString,
    ToDate,
    ToDateTime,
    ToTime,
    ToQuantity,
    // string
    IndexOf,
    Substring,
    StartsWith,
    EndsWith,
    Contains,
    Upper,
    Lower,
    Replace,
    Matches,
    ReplaceMatches,
    Length,
    ToChars,
    Trim,
    Split,
    Join,
    // math
    Abs,
    Ceiling,
    Floor,
    Round,
    Truncate,
    Sqrt,
    Power,
    // aggregate
    Sum,
    Min,
    Max,
    Avg,
    // temporal
    Now,
    Today,
    TimeOfDay,
    // utility
    Trace,
}

impl FunctionKind {
    /// Arguments are re-evaluated with each input item as `$this`
    pub fn is_lambda(self) -> bool {
        matches!(
            self,
            FunctionKind::Where
                | FunctionKind::Select
                | FunctionKind::Repeat
                | FunctionKind::All
                | FunctionKind::Exists
                | FunctionKind::Iif
        )
    }

    /// The single argument is a type specifier, not an expression
    pub fn takes_type(self) -> bool {
        matches!(self, FunctionKind::OfType | FunctionKind::Is | FunctionKind::As)
    }
}

/// Function metadata
#[derive(Debug, Clone, Copy)]
pub struct FunctionMetadata {
    pub kind: FunctionKind,
    pub name: &'static str,
    pub min_args: usize,
    pub max_args: usize,
}

macro_rules! function {
    ($kind:ident, $name:literal, $min:literal, $max:literal) => {
        FunctionMetadata {
            kind: FunctionKind::$kind,
            name: $name,
            min_args: $min,
            max_args: $max,
        }
    };
}

static FUNCTIONS_BY_NAME: phf::Map<&'static str, FunctionMetadata> = phf_map! {
    "empty" => function!(Empty, "empty", 0, 0),
    "exists" => function!(Exists, "exists", 0, 1),
    "all" => function!(All, "all", 1, 1),
    "allTrue" => function!(AllTrue, "allTrue", 0, 0),
    "anyTrue" => function!(AnyTrue, "anyTrue", 0, 0),
    "allFalse" => function!(AllFalse, "allFalse", 0, 0),
    "anyFalse" => function!(AnyFalse, "anyFalse", 0, 0),
    "subsetOf" => function!(SubsetOf, "subsetOf", 1, 1),
    "supersetOf" => function!(SupersetOf, "supersetOf", 1, 1),
    "count" => function!(Count, "count", 0, 0),
    "distinct" => function!(Distinct, "distinct", 0, 0),
    "isDistinct" => function!(IsDistinct, "isDistinct", 0, 0),
    "hasValue" => function!(HasValue, "hasValue", 0, 0),

    "where" => function!(Where, "where", 1, 1),
    "select" => function!(Select, "select", 1, 1),
    "repeat" => function!(Repeat, "repeat", 1, 1),
    "ofType" => function!(OfType, "ofType", 1, 1),

    "single" => function!(Single, "single", 0, 0),
    "first" => function!(First, "first", 0, 0),
    "last" => function!(Last, "last", 0, 0),
    "tail" => function!(Tail, "tail", 0, 0),
    "skip" => function!(Skip, "skip", 1, 1),
    "take" => function!(Take, "take", 1, 1),
    "intersect" => function!(Intersect, "intersect", 1, 1),
    "exclude" => function!(Exclude, "exclude", 1, 1),

    "union" => function!(Union, "union", 1, 1),
    "combine" => function!(Combine, "combine", 1, 1),

    "not" => function!(Not, "not", 0, 0),
    "iif" => function!(Iif, "iif", 2, 3),
    "is" => function!(Is, "is", 1, 1),
    "as" => function!(As, "as", 1, 1),

    "children" => function!(Children, "children", 0, 0),
    "descendants" => function!(Descendants, "descendants", 0, 0),
    "extension" => function!(Extension, "extension", 1, 1),

    "toBoolean" => function!(ToBoolean, "toBoolean", 0, 0),
    "convertsToBoolean" => function!(ConvertsToBoolean, "convertsToBoolean", 0, 0),
    "toInteger" => function!(ToInteger, "toInteger", 0, 0),
    "convertsToInteger" => function!(ConvertsToInteger, "convertsToInteger", 0, 0),
    "toDecimal" => function!(ToDecimal, "toDecimal", 0, 0),
    "convertsToDecimal" => function!(ConvertsToDecimal, "convertsToDecimal", 0, 0),
    "toString" => function!(ToString, "toString", 0, 0),
    "convertsToString" => function!(ConvertsToString, "convertsToString", 0, 0),
    "toDate" => function!(ToDate, "toDate", 0, 0),
    "toDateTime" => function!(ToDateTime, "toDateTime", 0, 0),
    "toTime" => function!(ToTime, "toTime", 0, 0),
    "toQuantity" => function!(ToQuantity, "toQuantity", 0, 1),

    "indexOf" => function!(IndexOf, "indexOf", 1, 1),
    "substring" => function!(Substring, "substring", 1, 2),
    "startsWith" => function!(StartsWith, "startsWith", 1, 1),
    "endsWith" => function!(EndsWith, "endsWith", 1, 1),
    "contains" => function!(Contains, "contains", 1, 1),
    "upper" => function!(Upper, "upper", 0, 0),
    "lower" => function!(Lower, "lower", 0, 0),
    "replace" => function!(Replace, "replace", 2, 2),
    "matches" => function!(Matches, "matches", 1, 1),
    "replaceMatches" => function!(ReplaceMatches, "replaceMatches", 2, 2),
    "length" => function!(Length, "length", 0, 0),
    "toChars" => function!(ToChars, "toChars", 0, 0),
    "trim" => function!(Trim, "trim", 0, 0),
    "split" => function!(Split, "split", 1, 1),
    "join" => function!(Join, "join", 0, 1),

    "abs" => function!(Abs, "abs", 0, 0),
    "ceiling" => function!(Ceiling, "ceiling", 0, 0),
    "floor" => function!(Floor, "floor", 0, 0),
    "round" => function!(Round, "round", 0, 1),
    "truncate" => function!(Truncate, "truncate", 0, 0),
    "sqrt" => function!(Sqrt, "sqrt", 0, 0),
    "power" => function!(Power, "power", 1, 1),

    "sum" => function!(Sum, "sum", 0, 0),
    "min" => function!(Min, "min", 0, 0),
    "max" => function!(Max, "max", 0, 0),
    "avg" => function!(Avg, "avg", 0, 0),

    "now" => function!(Now, "now", 0, 0),
    "today" => function!(Today, "today", 0, 0),
    "timeOfDay" => function!(TimeOfDay, "timeOfDay", 0, 0),

    "trace" => function!(Trace, "trace", 1, 2),
};

/// Look up a function by name
pub fn lookup(name: &str) -> Result<&'static FunctionMetadata> {
    FUNCTIONS_BY_NAME
        .get(name)
        .ok_or_else(|| Error::FunctionNotFound(name.to_string()))
}

impl FunctionMetadata {
    pub fn check_arity(&self, count: usize) -> Result<()> {
        if count < self.min_args || count > self.max_args {
            let expected = if self.min_args == self.max_args {
                self.min_args.to_string()
            } else {
                format!("{}..={}", self.min_args, self.max_args)
            };
            return Err(Error::EvaluationError(format!(
                "{}() expects {} argument(s), got {}",
                self.name, expected, count
            )));
        }
        Ok(())
    }
}

/// Runs a function whose arguments were evaluated up front.
pub(crate) fn call(
    kind: FunctionKind,
    input: Collection,
    args: &[Collection],
    ctx: &Context,
) -> Result<Collection> {
    use FunctionKind as F;
    match kind {
        F::Empty => existence::empty(input),
        F::Exists => existence::exists(input),
        F::AllTrue => existence::all_true(input),
        F::AnyTrue => existence::any_true(input),
        F::AllFalse => existence::all_false(input),
        F::AnyFalse => existence::any_false(input),
        F::SubsetOf => existence::subset_of(input, arg(args, 0)),
        F::SupersetOf => existence::superset_of(input, arg(args, 0)),
        F::Count => existence::count(input),
        F::Distinct => existence::distinct(input),
        F::IsDistinct => existence::is_distinct(input),
        F::HasValue => existence::has_value(input),
        F::Not => existence::not(input),

        F::Single => subsetting::single(input),
        F::First => subsetting::first(input),
        F::Last => subsetting::last(input),
        F::Tail => subsetting::tail(input),
        F::Skip => subsetting::skip(input, arg(args, 0)),
        F::Take => subsetting::take(input, arg(args, 0)),
        F::Intersect => subsetting::intersect(input, arg(args, 0)),
        F::Exclude => subsetting::exclude(input, arg(args, 0)),

        F::Union => combining::union(input, arg(args, 0)),
        F::Combine => combining::combine(input, arg(args, 0)),

        F::Children => navigation::children(input),
        F::Descendants => navigation::descendants(input),
        F::Extension => navigation::extension(input, arg(args, 0)),

        F::ToBoolean => conversion::to_boolean(input),
        F::ConvertsToBoolean => conversion::converts_to_boolean(input),
        F::ToInteger => conversion::to_integer(input),
        F::ConvertsToInteger => conversion::converts_to_integer(input),
        F::ToDecimal => conversion::to_decimal(input),
        F::ConvertsToDecimal => conversion::converts_to_decimal(input),
        F::ToString => conversion::to_string(input),
        F::ConvertsToString => conversion::converts_to_string(input),
        F::ToDate => conversion::to_date(input),
        F::ToDateTime => conversion::to_date_time(input),
        F::ToTime => conversion::to_time(input),
        F::ToQuantity => conversion::to_quantity(input, args.first()),

        F::IndexOf => string::index_of(input, arg(args, 0)),
        F::Substring => string::substring(input, arg(args, 0), args.get(1)),
        F::StartsWith => string::starts_with(input, arg(args, 0)),
        F::EndsWith => string::ends_with(input, arg(args, 0)),
        F::Contains => string::contains(input, arg(args, 0)),
        F::Upper => string::upper(input),
        F::Lower => string::lower(input),
        F::Replace => string::replace(input, arg(args, 0), arg(args, 1)),
        F::Matches => string::matches(input, arg(args, 0)),
        F::ReplaceMatches => string::replace_matches(input, arg(args, 0), arg(args, 1)),
        F::Length => string::length(input),
        F::ToChars => string::to_chars(input),
        F::Trim => string::trim(input),
        F::Split => string::split(input, arg(args, 0)),
        F::Join => string::join(input, args.first()),

        F::Abs => math::abs(input),
        F::Ceiling => math::ceiling(input),
        F::Floor => math::floor(input),
        F::Round => math::round(input, args.first()),
        F::Truncate => math::truncate(input),
        F::Sqrt => math::sqrt(input),
        F::Power => math::power(input, arg(args, 0)),

        F::Sum => aggregate::sum(input),
        F::Min => aggregate::min(input),
        F::Max => aggregate::max(input),
        F::Avg => aggregate::avg(input),

        F::Now => datetime::now(ctx),
        F::Today => datetime::today(ctx),
        F::TimeOfDay => datetime::time_of_day(ctx),

        F::Trace => utility::trace(input, arg(args, 0), args.get(1)),

        F::All | F::Where | F::Select | F::Repeat | F::Iif | F::OfType | F::Is | F::As => {
            Err(Error::InvalidOperation(format!(
                "{:?} requires expression arguments",
                kind
            )))
        }
    }
}

fn arg(args: &[Collection], index: usize) -> &Collection {
    static EMPTY: std::sync::OnceLock<Collection> = std::sync::OnceLock::new();
    args.get(index)
        .unwrap_or_else(|| EMPTY.get_or_init(Collection::empty))
}

pub(crate) fn boolean(value: bool) -> Collection {
    Collection::singleton(Value::boolean(value))
}

/// The input as a single string; `None` for an empty input.
pub(crate) fn single_string(input: &Collection, function: &str) -> Result<Option<Arc<str>>> {
    match input.as_singleton()? {
        None => Ok(None),
        Some(value) => value.as_str().map(|s| Some(Arc::from(s))).ok_or_else(|| {
            Error::TypeError(format!(
                "{}() expects a string input, got {}",
                function,
                value.type_name()
            ))
        }),
    }
}

pub(crate) fn integer_arg(arg: &Collection, function: &str) -> Result<Option<i64>> {
    match arg.as_singleton()? {
        None => Ok(None),
        Some(value) => match value.data() {
            crate::value::ValueData::Integer(i) => Ok(Some(*i)),
            _ => Err(Error::TypeError(format!(
                "{}() expects an integer argument, got {}",
                function,
                value.type_name()
            ))),
        },
    }
}
