use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{parse_macro_input, spanned::Spanned, FnArg, Ident, ItemFn, Pat, Signature, Type};

/// Transform an asynchronous test into a synchronous one, inject dependencies,
/// and ensure that any test database is dropped regardless of how the test
/// terminates.
///
/// Injectable dependencies are [`rocket::local::asynchronous::Client`] and
/// `crate::ballot_box::BallotBox`; both share the same storage.
///
/// By default the test runs against in-memory storage. With `mongo` it runs
/// against a fresh database on the server named by `EVOTING_TEST_DB_URI`,
/// and is ignored unless explicitly requested.
#[proc_macro_attribute]
pub fn backend_test(args: TokenStream, input: TokenStream) -> TokenStream {
    let mut item_fn = parse_macro_input!(input as ItemFn);

    // Extract type information and reject invalid function signatures.
    let test_args = match check_sig(item_fn.sig.clone()) {
        Ok(args) => args,
        Err(err) => {
            return err.into_compile_error().into();
        }
    };

    // Rename the future so the test can have its original name.
    let name = item_fn.sig.ident.clone();
    let new_name = format_ident!("{}_fut", name);
    item_fn.sig.ident = new_name.clone();

    // Pick the storage backend.
    let use_mongo = match parse_macro_input!(args as Option<Ident>) {
        None => false,
        Some(arg) if arg == "mongo" => true,
        Some(arg) => {
            return syn::Error::new(arg.span(), "Expected no arguments or `mongo`")
                .into_compile_error()
                .into();
        }
    };
    let (maybe_ignore, make_ballot_box) = if use_mongo {
        (
            quote! { #[ignore = "requires a MongoDB replica set"] },
            quote! {
                let (ballot_box, db) = crate::mongo_ballot_box().await;
                (ballot_box, Some(db))
            },
        )
    } else {
        (
            TokenStream2::new(),
            quote! { (crate::memory_ballot_box(), None) },
        )
    };

    // Rewrite the test function.
    quote! {
        #[test]
        #maybe_ignore
        fn #name() {
            /// Test setup.
            async fn setup() -> (
                rocket::local::asynchronous::Client,
                crate::ballot_box::BallotBox,
                Option<mongodb::Database>,
            ) {
                crate::init_test_logging();
                let (ballot_box, db): (crate::ballot_box::BallotBox, Option<mongodb::Database>) = {
                    #make_ballot_box
                };
                let rocket_client = rocket::local::asynchronous::Client::tracked(
                    crate::rocket_for_ballot_box(ballot_box.clone()),
                )
                .await
                .unwrap();
                (rocket_client, ballot_box, db)
            }

            /// The test itself.
            #item_fn

            /// Test cleanup.
            async fn cleanup(db: Option<mongodb::Database>) {
                if let Some(db) = db {
                    db.drop(None).await.unwrap();
                }
            }

            // Create an async runtime. We need a separate one for inside and
            // outside the `catch_unwind`.
            let outer_runtime = rocket::tokio::runtime::Builder::new_multi_thread()
                .thread_name("test-setup-cleanup")
                .worker_threads(1)
                .enable_all()
                .build()
                .unwrap();
            let inner_runtime = rocket::tokio::runtime::Builder::new_multi_thread()
                .thread_name("rocket-worker-test-thread")
                .worker_threads(4)
                .enable_all()
                .build()
                .unwrap();

            // Run the setup.
            let (rocket_client, ballot_box, db) = outer_runtime.block_on(setup());

            // Run the test, catching any panics.
            // Use mutexes to safely transfer `!UnwindSafe` data.
            let client_mutex = std::sync::Mutex::new(rocket_client);
            let ballot_box_mutex = std::sync::Mutex::new(ballot_box);
            let runtime_mutex = std::sync::Mutex::new(inner_runtime);
            let result = std::panic::catch_unwind(|| {
                #[allow(unused_variables)]
                let rocket_client = client_mutex.into_inner().unwrap();
                #[allow(unused_variables)]
                let ballot_box = ballot_box_mutex.into_inner().unwrap();
                let runtime = runtime_mutex.into_inner().unwrap();

                runtime.block_on(#new_name(#(#test_args),*));
            });

            // Run the cleanup.
            outer_runtime.block_on(cleanup(db));

            // If the test panicked, re-raise the panic.
            if let Err(cause) = result {
                std::panic::panic_any(cause);
            }
        }
    }
    .into()
}

/// Ensure the wrapped test is async, extract parameters to inject, and reject unknown parameters.
fn check_sig(sig: Signature) -> Result<Vec<TokenStream2>, syn::Error> {
    if sig.asyncness.is_none() {
        return Err(syn::Error::new(sig.span(), "Test must be marked `async`"));
    }

    let mut has_client = false;
    let mut has_ballot_box = false;
    let mut args = vec![];

    for input in &sig.inputs {
        if let FnArg::Typed(pat_type) = input {
            if let Pat::Ident(_) = &*pat_type.pat {
                if let Type::Path(type_path) = &*pat_type.ty {
                    if let Some(type_ident) = type_path.path.get_ident() {
                        if type_ident == "Client" {
                            if has_client {
                                return Err(syn::Error::new(input.span(), "Test cannot accept more than one `rocket::local::asynchronous::Client`"));
                            }
                            has_client = true;
                            args.push(quote! { rocket_client });
                            continue;
                        } else if type_ident == "BallotBox" {
                            if has_ballot_box {
                                return Err(syn::Error::new(
                                    input.span(),
                                    "Test cannot accept more than one `BallotBox`",
                                ));
                            }
                            has_ballot_box = true;
                            args.push(quote! { ballot_box });
                            continue;
                        }
                    }
                }
            }
        }

        return Err(syn::Error::new(
            input.span(),
            "Expected one of `client_ident: Client` or `ballot_box_ident: BallotBox`",
        ));
    }

    Ok(args)
}
