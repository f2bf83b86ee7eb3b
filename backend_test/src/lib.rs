use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{parse_macro_input, spanned::Spanned, FnArg, Ident, ItemFn, Pat, Signature, Type};

/// Transform an asynchronous test into a synchronous one, inject dependencies,
/// and ensure that the backing storage is cleared regardless of how the test terminates.
///
/// Injectable dependencies are [`rocket::local::asynchronous::Client`],
/// [`crate::lifecycle::ElectionLifecycle`], and [`crate::testing::TestBackend`].
/// All of them share the same stores.
///
/// By default the stores live in memory. `#[backend_test(mongo)]` runs the test
/// against a throwaway database on the MongoDB server at `DB_URI` instead; such
/// tests are ignored unless requested with `--ignored`.
#[proc_macro_attribute]
pub fn backend_test(args: TokenStream, input: TokenStream) -> TokenStream {
    let mut item_fn = parse_macro_input!(input as ItemFn);

    // Extract type information and reject invalid function signatures.
    let (test_args, needs_client) = match check_sig(item_fn.sig.clone()) {
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
    let (make_backend, maybe_ignore) = match parse_macro_input!(args as Option<Ident>) {
        None => (quote! { crate::testing::TestBackend::memory() }, quote! {}),
        Some(arg) if arg == "mongo" => (
            quote! { crate::testing::TestBackend::mongo().await },
            quote! { #[ignore = "needs a MongoDB server at DB_URI"] },
        ),
        Some(arg) => {
            return syn::Error::new(arg.span(), "Expected no argument or `mongo`")
                .into_compile_error()
                .into();
        }
    };

    let make_client = if needs_client {
        quote! { Some(backend.client().await) }
    } else {
        quote! { None }
    };

    // Rewrite the test function.
    quote! {
        #[test]
        #maybe_ignore
        fn #name() {
            /// Test setup.
            async fn setup() -> (
                Option<rocket::local::asynchronous::Client>,
                crate::testing::TestBackend,
            ) {
                crate::testing::init_logging();
                let backend = #make_backend;
                let rocket_client = #make_client;
                (rocket_client, backend)
            }

            /// The test itself.
            #item_fn

            /// Test cleanup.
            async fn cleanup(backend: crate::testing::TestBackend) {
                backend.cleanup().await;
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
                .worker_threads(2)
                .enable_all()
                .build()
                .unwrap();

            // Run the setup.
            let (rocket_client, backend) = outer_runtime.block_on(setup());

            // Run the test, catching any panics.
            // Use mutexes to safely transfer `!UnwindSafe` data.
            let client_mutex = std::sync::Mutex::new(rocket_client);
            let backend_mutex = std::sync::Mutex::new(backend.clone());
            let runtime_mutex = std::sync::Mutex::new(inner_runtime);
            let result = std::panic::catch_unwind(|| {
                #[allow(unused_variables)]
                let rocket_client = client_mutex.into_inner().unwrap();
                #[allow(unused_variables)]
                let backend = backend_mutex.into_inner().unwrap();
                let runtime = runtime_mutex.into_inner().unwrap();

                runtime.block_on(#new_name(#(#test_args),*));
            });

            // Run the cleanup.
            outer_runtime.block_on(cleanup(backend));

            // If the test panicked, re-raise the panic.
            if let Err(cause) = result {
                std::panic::resume_unwind(cause);
            }
        }
    }
    .into()
}

/// Ensure the wrapped test is async, extract parameters to inject, and reject unknown parameters.
///
/// Returns the argument expressions and whether a rocket client is needed.
fn check_sig(sig: Signature) -> Result<(Vec<TokenStream2>, bool), syn::Error> {
    if sig.asyncness.is_none() {
        return Err(syn::Error::new(sig.span(), "Test must be marked `async`"));
    }

    let mut has_client = false;
    let mut has_lifecycle = false;
    let mut has_backend = false;
    let mut args = vec![];

    for input in &sig.inputs {
        if let FnArg::Typed(pat_type) = input {
            if let (Pat::Ident(_), Type::Path(type_path)) = (&*pat_type.pat, &*pat_type.ty) {
                // Valid as the last path segment for any type is itself
                if let Some(segment) = type_path.path.segments.last() {
                    let (seen, arg, what) = if segment.ident == "Client" {
                        (
                            &mut has_client,
                            quote! { rocket_client.expect("client was set up") },
                            "rocket::local::asynchronous::Client",
                        )
                    } else if segment.ident == "ElectionLifecycle" {
                        (
                            &mut has_lifecycle,
                            quote! { backend.lifecycle() },
                            "ElectionLifecycle",
                        )
                    } else if segment.ident == "TestBackend" {
                        (&mut has_backend, quote! { backend.clone() }, "TestBackend")
                    } else {
                        return Err(unexpected_arg(input));
                    };
                    if *seen {
                        return Err(syn::Error::new(
                            input.span(),
                            format!("Test cannot accept more than one `{what}`"),
                        ));
                    }
                    *seen = true;
                    args.push(arg);
                    continue;
                }
            }
        }

        return Err(unexpected_arg(input));
    }

    Ok((args, has_client))
}

fn unexpected_arg(input: &FnArg) -> syn::Error {
    syn::Error::new(
        input.span(),
        "Expected one of `client_ident: Client`, `lifecycle_ident: ElectionLifecycle` or `backend_ident: TestBackend`",
    )
}
