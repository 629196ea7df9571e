// Market data module entrypoint
pub mod adapters;       // pull-side sources (Polymarket CLOB REST)
pub mod normaliser;     // loosely typed wire values -> levels, changes, points
pub mod stream;         // push-side session feeding the book merge engine
pub mod reconcile;      // polling backstop writing the fallback cells
pub mod tracker;        // consumer facade choosing live vs fallback data
