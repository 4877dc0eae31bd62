//! Message router
//!
//! Maps a message's route to the module handler that owns it. Routes are
//! registered once while the application is assembled.

use crate::{Error, Result};
use std::collections::BTreeMap;
use thorchain_core::{Context, Tags};
use thorchain_modules::{Handler, ModuleError, Msg};

/// Route → handler
#[derive(Default)]
pub struct Router {
    routes: BTreeMap<&'static str, Box<dyn Handler>>,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.routes.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Router {
    /// Empty router
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for one route
    pub fn add_route(&mut self, route: &'static str, handler: Box<dyn Handler>) -> Result<()> {
        if self.routes.contains_key(route) {
            return Err(Error::DuplicateRoute(route.to_string()));
        }
        self.routes.insert(route, handler);
        Ok(())
    }

    /// Registered routes, sorted
    pub fn routes(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.routes.keys().copied()
    }

    /// Handler responsible for `msg`
    pub fn route(&self, msg: &Msg) -> Option<&dyn Handler> {
        self.routes.get(msg.route()).map(|handler| handler.as_ref())
    }

    /// Run `msg` through its handler
    pub fn dispatch(&self, ctx: &mut Context<'_>, msg: &Msg) -> thorchain_modules::Result<Tags> {
        let handler = self.route(msg).ok_or_else(|| {
            ModuleError::UnknownRequest(format!("no route for message kind {}", msg.kind()))
        })?;
        handler.handle(ctx, msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use thorchain_core::{Address, BlockHeader, Coins, MemStore, StoreKey, Tag};
    use thorchain_modules::{AccountKeeper, BankHandler, BankKeeper, MsgSend};

    struct Echo;

    impl Handler for Echo {
        fn route(&self) -> &'static str {
            "bank"
        }

        fn handle(&self, _ctx: &mut Context<'_>, msg: &Msg) -> thorchain_modules::Result<Tags> {
            Ok(vec![Tag::new("echo", msg.kind())])
        }
    }

    fn bank() -> Box<dyn Handler> {
        Box::new(BankHandler::new(BankKeeper::new(AccountKeeper::new(StoreKey::new("acc")))))
    }

    fn send() -> Msg {
        MsgSend {
            from: Address::from_bytes([1; 20]),
            to: Address::from_bytes([2; 20]),
            amount: Coins::single("RUNE", 1),
        }
        .into()
    }

    #[test]
    fn test_duplicate_route_rejected() {
        let mut router = Router::new();
        router.add_route("bank", bank()).unwrap();
        let err = router.add_route("bank", Box::new(Echo)).unwrap_err();
        assert!(matches!(err, Error::DuplicateRoute(route) if route == "bank"));
    }

    #[test]
    fn test_dispatch_reaches_registered_handler() {
        let mut router = Router::new();
        router.add_route("bank", Box::new(Echo)).unwrap();

        let mut store = MemStore::new();
        let mut ctx = Context::new(&mut store, BlockHeader::genesis("test", Utc::now()));
        let tags = router.dispatch(&mut ctx, &send()).unwrap();
        assert_eq!(tags, vec![Tag::new("echo", "bank/send")]);
    }

    #[test]
    fn test_unrouted_message() {
        let router = Router::new();
        let mut store = MemStore::new();
        let mut ctx = Context::new(&mut store, BlockHeader::genesis("test", Utc::now()));
        assert!(router.route(&send()).is_none());
        assert!(matches!(
            router.dispatch(&mut ctx, &send()),
            Err(ModuleError::UnknownRequest(_))
        ));
    }
}
