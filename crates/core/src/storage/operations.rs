use super::query::Query;
use super::traits::Record;

/// Evaluates `query` over `records`: filter, order, skip, limit.
///
/// The caller's comparator is refined by record key, so the result is
/// independent of the input order. Two stores holding the same records
/// therefore agree on which records a bounded query selects.
pub fn apply_query<R, I>(records: I, query: &Query<R>) -> Vec<R>
where
    R: Record,
    I: IntoIterator<Item = R>,
{
    let mut matched: Vec<R> = records
        .into_iter()
        .filter(|record| query.matches(record))
        .collect();

    matched.sort_by(|a, b| query.compare(a, b).then_with(|| a.key().cmp(&b.key())));

    matched
        .into_iter()
        .skip(query.skip.unwrap_or(0))
        .take(query.limit.unwrap_or(usize::MAX))
        .collect()
}

/// Returns the keys of the records `query` selects, in selection order.
pub fn matching_keys<R, I>(records: I, query: &Query<R>) -> Vec<R::Key>
where
    R: Record,
    I: IntoIterator<Item = R>,
{
    apply_query(records, query)
        .iter()
        .map(Record::key)
        .collect()
}
